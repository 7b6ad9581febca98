//! Configuration types for the exchange.

use exchange_types::{Address, ExchangeDomain, ExchangeVariant, FeeConfig, FeeRate};
use serde::{Deserialize, Serialize};

/// Complete exchange configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
	/// Exchange identity and flavour
	pub exchange: ExchangeSettings,
	/// Protocol and operator fees
	#[serde(default = "default_fees")]
	pub fees: FeeConfig,
	/// Named strategies, each a table with `kind` and `address`
	#[serde(default = "empty_table")]
	pub strategies: toml::Value,
	/// Storage backend, passed to the storage factory
	#[serde(default = "default_storage")]
	pub storage: toml::Value,
	#[serde(default)]
	pub logging: LoggingSettings,
}

/// Exchange identity and flavour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeSettings {
	/// Signing domain name
	pub name: String,
	/// Signing domain version
	pub version: String,
	pub chain_id: u64,
	/// Address orders are bound to
	pub verifying_contract: Address,
	pub variant: ExchangeVariant,
	/// Asset contracts that settle through the managed-asset path and so
	/// cannot trade here
	#[serde(default)]
	pub managed_assets: Vec<Address>,
	/// Seconds per block, used to derive block numbers from wall time
	#[serde(default = "default_block_time")]
	pub block_time_secs: u64,
}

impl ExchangeSettings {
	pub fn domain(&self) -> ExchangeDomain {
		ExchangeDomain::new(
			self.name.clone(),
			self.version.clone(),
			self.chain_id,
			self.verifying_contract,
		)
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
	/// Filter directive, e.g. "info" or "exchange_core=debug"
	#[serde(default = "default_log_level")]
	pub level: String,
	/// Emit JSON lines instead of human readable output
	#[serde(default)]
	pub json: bool,
}

impl Default for LoggingSettings {
	fn default() -> Self {
		Self {
			level: default_log_level(),
			json: false,
		}
	}
}

fn default_fees() -> FeeConfig {
	FeeConfig {
		protocol: FeeRate::new(Address::ZERO, 0),
		operator: FeeRate::new(Address::ZERO, 0),
	}
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}

fn default_storage() -> toml::Value {
	let mut table = toml::map::Map::new();
	table.insert("backend".to_string(), toml::Value::String("memory".to_string()));
	toml::Value::Table(table)
}

fn default_block_time() -> u64 {
	12
}

fn default_log_level() -> String {
	"info".to_string()
}
