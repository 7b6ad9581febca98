//! Order matching and settlement engine for the exchange.
//!
//! [`ExchangeBuilder`] turns an [`ExchangeConfig`] plus the external
//! collaborators (asset contracts and currency ledger) into a ready
//! [`MatchingEngine`].

use exchange_config::ExchangeConfig;
use exchange_settlement::implementations::memory::{StaticAssetRegistry, StaticFeeConfig};
use exchange_settlement::{
	AssetRegistry, AssetTransferGateway, CurrencyLedger, FeeConfigProvider, FeeWaterfall,
	SettlementService,
};
use exchange_signature::StructuredSignature;
use exchange_storage::{OrderStore, StorageInterface, StorageService};
use exchange_types::{Clock, EventBus, SystemClock};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

pub mod engine;

pub use engine::MatchingEngine;

/// Events buffered per subscriber.
const EVENT_CAPACITY: usize = 1000;

#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing collaborator: {0}")]
	MissingCollaborator(&'static str),
}

/// Assembles a [`MatchingEngine`] from configuration.
///
/// The asset gateway and currency ledger must be supplied. Fee rates,
/// managed assets, storage and the clock default to what the configuration
/// describes and can be overridden.
pub struct ExchangeBuilder {
	config: ExchangeConfig,
	assets: Option<Arc<dyn AssetTransferGateway>>,
	ledger: Option<Arc<dyn CurrencyLedger>>,
	fees: Option<Arc<dyn FeeConfigProvider>>,
	registry: Option<Arc<dyn AssetRegistry>>,
	clock: Option<Arc<dyn Clock>>,
	storage: Option<Box<dyn StorageInterface>>,
	event_bus: Option<EventBus>,
}

impl ExchangeBuilder {
	pub fn new(config: ExchangeConfig) -> Self {
		Self {
			config,
			assets: None,
			ledger: None,
			fees: None,
			registry: None,
			clock: None,
			storage: None,
			event_bus: None,
		}
	}

	pub fn with_assets(mut self, assets: Arc<dyn AssetTransferGateway>) -> Self {
		self.assets = Some(assets);
		self
	}

	pub fn with_ledger(mut self, ledger: Arc<dyn CurrencyLedger>) -> Self {
		self.ledger = Some(ledger);
		self
	}

	/// Replaces the configured fee rates with a live provider.
	pub fn with_fees(mut self, fees: Arc<dyn FeeConfigProvider>) -> Self {
		self.fees = Some(fees);
		self
	}

	/// Replaces the configured managed-asset list.
	pub fn with_registry(mut self, registry: Arc<dyn AssetRegistry>) -> Self {
		self.registry = Some(registry);
		self
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);
		self
	}

	/// Replaces the configured storage backend.
	pub fn with_storage(mut self, storage: Box<dyn StorageInterface>) -> Self {
		self.storage = Some(storage);
		self
	}

	pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
		self.event_bus = Some(event_bus);
		self
	}

	pub fn build(self) -> Result<MatchingEngine, BuilderError> {
		let config = self.config;
		let exchange = &config.exchange;

		let assets = self
			.assets
			.ok_or(BuilderError::MissingCollaborator("asset transfer gateway"))?;
		let ledger = self
			.ledger
			.ok_or(BuilderError::MissingCollaborator("currency ledger"))?;
		let fees = self
			.fees
			.unwrap_or_else(|| Arc::new(StaticFeeConfig::new(config.fees)));
		let registry = self.registry.unwrap_or_else(|| {
			Arc::new(StaticAssetRegistry::new(exchange.managed_assets.clone()))
		});
		let clock = self
			.clock
			.unwrap_or_else(|| Arc::new(SystemClock::new(exchange.block_time_secs)));

		let storage = match self.storage {
			Some(storage) => storage,
			None => exchange_storage::create_storage(&config.storage)
				.map_err(|e| BuilderError::Config(e.to_string()))?,
		};
		let strategies = exchange_strategy::create_strategy_service(&config.strategies)
			.map_err(|e| BuilderError::Config(e.to_string()))?;

		let variant = exchange.variant;
		let settlement = SettlementService::new(
			assets,
			ledger,
			fees,
			FeeWaterfall::new(variant.royalty_basis()),
		);

		info!(
			name = %exchange.name,
			chain_id = exchange.chain_id,
			variant = ?variant,
			strategies = strategies.len(),
			"Exchange engine built"
		);

		Ok(MatchingEngine {
			variant,
			signatures: StructuredSignature::new(exchange.domain()),
			strategies,
			store: OrderStore::new(StorageService::new(storage)),
			settlement,
			registry,
			clock,
			event_bus: self
				.event_bus
				.unwrap_or_else(|| EventBus::new(EVENT_CAPACITY)),
			op_lock: Mutex::new(()),
		})
	}
}
