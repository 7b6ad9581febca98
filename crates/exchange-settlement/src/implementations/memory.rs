//! In-memory collaborators.
//!
//! Balances, royalties, fee rates and managed-asset flags kept in process
//! memory. Used by tests and by local tooling that runs the exchange without
//! a chain behind it.

use crate::{
	AssetRegistry, AssetTransferGateway, CurrencyLedger, FeeConfigProvider, SettlementError,
};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use exchange_types::{AssetId, FeeConfig, FeeRate};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::fees::per_mille;

/// Currency balances per `(currency, holder)`.
#[derive(Default)]
pub struct InMemoryLedger {
	balances: RwLock<HashMap<(Address, Address), U256>>,
}

impl InMemoryLedger {
	pub fn new() -> Self {
		Self::default()
	}

	/// Credits `amount` of `currency` to `holder`.
	pub async fn mint(&self, currency: Address, holder: Address, amount: U256) {
		let mut balances = self.balances.write().await;
		*balances.entry((currency, holder)).or_default() += amount;
	}

	pub async fn balance_of(&self, currency: Address, holder: Address) -> U256 {
		self.balances
			.read()
			.await
			.get(&(currency, holder))
			.copied()
			.unwrap_or_default()
	}
}

#[async_trait]
impl CurrencyLedger for InMemoryLedger {
	async fn transfer_from(
		&self,
		currency: Address,
		payer: Address,
		payee: Address,
		amount: U256,
	) -> bool {
		let mut balances = self.balances.write().await;
		let available = balances
			.get(&(currency, payer))
			.copied()
			.unwrap_or_default();
		if available < amount {
			return false;
		}

		balances.insert((currency, payer), available - amount);
		*balances.entry((currency, payee)).or_default() += amount;
		true
	}
}

/// Asset holdings and royalty settings.
#[derive(Default)]
pub struct InMemoryAssets {
	holdings: RwLock<HashMap<(AssetId, Address), U256>>,
	royalties: RwLock<HashMap<Address, FeeRate>>,
}

impl InMemoryAssets {
	pub fn new() -> Self {
		Self::default()
	}

	/// Gives `holder` `amount` units of `asset`.
	pub async fn mint(&self, asset: AssetId, holder: Address, amount: U256) {
		let mut holdings = self.holdings.write().await;
		*holdings.entry((asset, holder)).or_default() += amount;
	}

	/// Sets the royalty for every unit of `contract`.
	pub async fn set_royalty(&self, contract: Address, royalty: FeeRate) {
		self.royalties.write().await.insert(contract, royalty);
	}

	pub async fn balance_of(&self, asset: &AssetId, holder: Address) -> U256 {
		self.holdings
			.read()
			.await
			.get(&(*asset, holder))
			.copied()
			.unwrap_or_default()
	}
}

#[async_trait]
impl AssetTransferGateway for InMemoryAssets {
	async fn transfer_units(
		&self,
		asset: &AssetId,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<(), SettlementError> {
		let mut holdings = self.holdings.write().await;
		let held = holdings.get(&(*asset, from)).copied().unwrap_or_default();
		if held < amount {
			return Err(SettlementError::Asset(format!(
				"{} holds {} units, {} requested",
				from, held, amount
			)));
		}

		holdings.insert((*asset, from), held - amount);
		*holdings.entry((*asset, to)).or_default() += amount;
		Ok(())
	}

	async fn owner_or_balance(
		&self,
		asset: &AssetId,
		holder: Address,
	) -> Result<U256, SettlementError> {
		Ok(self.balance_of(asset, holder).await)
	}

	async fn royalty_info(
		&self,
		asset: &AssetId,
		sale_price: U256,
	) -> Result<Option<(Address, U256)>, SettlementError> {
		let royalties = self.royalties.read().await;
		let Some(royalty) = royalties.get(&asset.contract) else {
			return Ok(None);
		};
		let amount = per_mille(sale_price, royalty.rate_per_mille).ok_or_else(|| {
			SettlementError::Arithmetic(format!("royalty on {}", sale_price))
		})?;
		Ok(Some((royalty.recipient, amount)))
	}
}

/// Fee configuration that can be changed at runtime.
pub struct StaticFeeConfig {
	config: RwLock<FeeConfig>,
}

impl StaticFeeConfig {
	pub fn new(config: FeeConfig) -> Self {
		Self {
			config: RwLock::new(config),
		}
	}

	pub async fn update(&self, config: FeeConfig) {
		*self.config.write().await = config;
	}
}

#[async_trait]
impl FeeConfigProvider for StaticFeeConfig {
	async fn protocol_fee_info(&self) -> FeeRate {
		self.config.read().await.protocol
	}

	async fn operational_fee_info(&self) -> FeeRate {
		self.config.read().await.operator
	}

	async fn fee_config(&self) -> FeeConfig {
		*self.config.read().await
	}
}

/// Fixed set of protocol-managed asset contracts.
#[derive(Default)]
pub struct StaticAssetRegistry {
	managed: RwLock<HashSet<Address>>,
}

impl StaticAssetRegistry {
	pub fn new(managed: impl IntoIterator<Item = Address>) -> Self {
		Self {
			managed: RwLock::new(managed.into_iter().collect()),
		}
	}

	pub async fn add_managed(&self, contract: Address) {
		self.managed.write().await.insert(contract);
	}
}

#[async_trait]
impl AssetRegistry for StaticAssetRegistry {
	async fn is_managed_asset(&self, contract: Address) -> bool {
		self.managed.read().await.contains(&contract)
	}
}
