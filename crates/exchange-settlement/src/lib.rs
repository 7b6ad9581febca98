//! Settlement module for the exchange.
//!
//! Moves currency and asset units for a match through external collaborators
//! (asset contracts, currency ledger, fee configuration) and splits the price
//! with the fee waterfall. A settlement either completes every leg or unwinds
//! the legs it already performed before reporting the failure.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use exchange_types::{AssetId, ExchangeError, FeeConfig, FeeRate, FeeSplit, OrderHash};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

pub mod fees;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

pub use fees::{per_mille, FeeWaterfall};

/// Errors that can occur while settling a match.
#[derive(Debug, Error)]
pub enum SettlementError {
	/// A currency leg could not be performed.
	#[error("Currency transfer failed: {0}")]
	Funds(String),
	/// The asset leg could not be performed.
	#[error("Asset transfer failed: {0}")]
	Asset(String),
	/// A collaborator could not answer a query.
	#[error("Collaborator error: {0}")]
	Collaborator(String),
	/// The price is too large to split.
	#[error("Arithmetic overflow: {0}")]
	Arithmetic(String),
}

impl From<SettlementError> for ExchangeError {
	fn from(err: SettlementError) -> Self {
		match err {
			SettlementError::Funds(msg) => ExchangeError::FailedToTransferFunds(msg),
			SettlementError::Asset(msg) => ExchangeError::FailedToTransferAsset(msg),
			SettlementError::Collaborator(msg) => ExchangeError::FailedToTransferAsset(msg),
			SettlementError::Arithmetic(msg) => ExchangeError::Failure(msg),
		}
	}
}

/// Asset contracts: unit transfers, holdings and royalty lookups.
#[async_trait]
pub trait AssetTransferGateway: Send + Sync {
	/// Moves `amount` units of `asset` from `from` to `to`.
	async fn transfer_units(
		&self,
		asset: &AssetId,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<(), SettlementError>;

	/// Units of `asset` held by `holder` (0 or 1 for single-unit assets).
	async fn owner_or_balance(&self, asset: &AssetId, holder: Address)
		-> Result<U256, SettlementError>;

	/// Royalty owed on a sale of `asset` for `sale_price`.
	async fn royalty_info(
		&self,
		asset: &AssetId,
		sale_price: U256,
	) -> Result<Option<(Address, U256)>, SettlementError>;
}

/// Currency movements between accounts.
#[async_trait]
pub trait CurrencyLedger: Send + Sync {
	/// Moves `amount` of `currency` from `payer` to `payee`. Returns false when
	/// the movement cannot complete; nothing is moved in that case.
	async fn transfer_from(
		&self,
		currency: Address,
		payer: Address,
		payee: Address,
		amount: U256,
	) -> bool;
}

/// Live protocol and operator fee configuration.
#[async_trait]
pub trait FeeConfigProvider: Send + Sync {
	async fn protocol_fee_info(&self) -> FeeRate;

	async fn operational_fee_info(&self) -> FeeRate;

	async fn fee_config(&self) -> FeeConfig {
		FeeConfig {
			protocol: self.protocol_fee_info().await,
			operator: self.operational_fee_info().await,
		}
	}
}

/// Knows which asset contracts the protocol itself manages.
#[async_trait]
pub trait AssetRegistry: Send + Sync {
	async fn is_managed_asset(&self, contract: Address) -> bool;
}

/// One match to settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRequest {
	pub ask_hash: OrderHash,
	pub asset: AssetId,
	pub currency: Address,
	/// Current holder of the asset.
	pub seller: Address,
	/// Receives the seller's net proceeds.
	pub proceeds_recipient: Address,
	/// Pays the gross price.
	pub buyer: Address,
	/// Receives the asset units.
	pub recipient: Address,
	/// Units changing hands.
	pub units: U256,
	/// Total price paid by the buyer.
	pub gross: U256,
}

/// A single currency movement performed during settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyLeg {
	pub payer: Address,
	pub payee: Address,
	pub amount: U256,
}

/// What a completed settlement did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
	pub request: SettlementRequest,
	pub split: FeeSplit,
	pub legs: Vec<CurrencyLeg>,
}

/// Settles matches against the configured collaborators.
pub struct SettlementService {
	assets: Arc<dyn AssetTransferGateway>,
	ledger: Arc<dyn CurrencyLedger>,
	fees: Arc<dyn FeeConfigProvider>,
	waterfall: FeeWaterfall,
}

impl SettlementService {
	pub fn new(
		assets: Arc<dyn AssetTransferGateway>,
		ledger: Arc<dyn CurrencyLedger>,
		fees: Arc<dyn FeeConfigProvider>,
		waterfall: FeeWaterfall,
	) -> Self {
		Self {
			assets,
			ledger,
			fees,
			waterfall,
		}
	}

	pub fn waterfall(&self) -> FeeWaterfall {
		self.waterfall
	}

	/// Computes the split and the currency legs for `request` using the fee
	/// configuration and royalty information current at call time.
	pub async fn quote(
		&self,
		request: &SettlementRequest,
	) -> Result<(FeeSplit, Vec<CurrencyLeg>), SettlementError> {
		let fee_config = self.fees.fee_config().await;
		let gross = request.gross;

		let (protocol_cut, operator_cut) = self
			.waterfall
			.platform_cuts(
				gross,
				fee_config.protocol.rate_per_mille,
				fee_config.operator.rate_per_mille,
			)
			.ok_or_else(|| {
				SettlementError::Arithmetic(format!("platform fees on {}", gross))
			})?;
		let base = self.waterfall.royalty_base(gross, protocol_cut, operator_cut);
		let royalty = self.assets.royalty_info(&request.asset, base).await?;
		let royalty_cut = royalty.map(|(_, amount)| amount).unwrap_or(U256::ZERO);

		let split = self
			.waterfall
			.finish(gross, protocol_cut, operator_cut, royalty_cut);

		let mut payees = vec![
			(fee_config.protocol.recipient, split.protocol_cut),
			(fee_config.operator.recipient, split.operator_cut),
		];
		if let Some((royalty_recipient, _)) = royalty {
			payees.push((royalty_recipient, split.royalty_cut));
		}
		payees.push((request.proceeds_recipient, split.seller_net));

		let legs = payees
			.into_iter()
			.filter(|(_, amount)| !amount.is_zero())
			.map(|(payee, amount)| CurrencyLeg {
				payer: request.buyer,
				payee,
				amount,
			})
			.collect();

		Ok((split, legs))
	}

	/// Performs every leg of `request`.
	///
	/// On failure, legs already performed are reversed before the error is
	/// returned.
	pub async fn settle(
		&self,
		request: SettlementRequest,
	) -> Result<SettlementReceipt, SettlementError> {
		let held = self
			.assets
			.owner_or_balance(&request.asset, request.seller)
			.await?;
		if held < request.units {
			return Err(SettlementError::Asset(format!(
				"seller {} holds {} of {} units",
				request.seller, held, request.units
			)));
		}

		let (split, legs) = self.quote(&request).await?;
		debug!(
			ask_hash = %request.ask_hash,
			gross = %request.gross,
			protocol = %split.protocol_cut,
			operator = %split.operator_cut,
			royalty = %split.royalty_cut,
			seller = %split.seller_net,
			"Computed fee split"
		);

		let mut completed = Vec::with_capacity(legs.len());
		for leg in legs {
			if !self
				.ledger
				.transfer_from(request.currency, leg.payer, leg.payee, leg.amount)
				.await
			{
				self.reverse_legs(request.currency, &completed).await;
				return Err(SettlementError::Funds(format!(
					"{} could not pay {} to {}",
					leg.payer, leg.amount, leg.payee
				)));
			}
			completed.push(leg);
		}

		if let Err(e) = self
			.assets
			.transfer_units(
				&request.asset,
				request.seller,
				request.recipient,
				request.units,
			)
			.await
		{
			self.reverse_legs(request.currency, &completed).await;
			return Err(e);
		}

		info!(
			ask_hash = %request.ask_hash,
			buyer = %request.buyer,
			recipient = %request.recipient,
			units = %request.units,
			gross = %request.gross,
			"Settled match"
		);

		Ok(SettlementReceipt {
			request,
			split,
			legs: completed,
		})
	}

	/// Reverses a completed settlement.
	pub async fn unwind(&self, receipt: &SettlementReceipt) {
		let request = &receipt.request;
		if let Err(e) = self
			.assets
			.transfer_units(
				&request.asset,
				request.recipient,
				request.seller,
				request.units,
			)
			.await
		{
			error!(ask_hash = %request.ask_hash, error = %e, "Failed to return asset units");
		}
		self.reverse_legs(request.currency, &receipt.legs).await;
	}

	async fn reverse_legs(&self, currency: Address, legs: &[CurrencyLeg]) {
		for leg in legs.iter().rev() {
			if !self
				.ledger
				.transfer_from(currency, leg.payee, leg.payer, leg.amount)
				.await
			{
				error!(
					payer = %leg.payer,
					payee = %leg.payee,
					amount = %leg.amount,
					"Failed to reverse currency leg"
				);
			}
		}
	}
}
