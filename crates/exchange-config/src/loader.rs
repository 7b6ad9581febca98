//! Configuration loading from files and environment.

use crate::types::*;
use crate::ConfigError;
use anyhow::{Context, Result};
use exchange_types::FEE_DENOMINATOR;
use regex::Regex;
use std::env;
use std::path::Path;
use tracing::{debug, info};

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self {
			env_prefix: "EXCHANGE_".to_string(),
		}
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	/// Loads, overrides and validates configuration from a file.
	///
	/// The format follows the extension: `.toml`, `.json`, `.yaml` or `.yml`.
	pub fn from_file<P: AsRef<Path>>(&self, path: P) -> Result<ExchangeConfig> {
		let path = path.as_ref();
		info!("Loading configuration from {:?}", path);

		let contents = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read config file: {:?}", path))?;
		let contents = self.substitute_env_vars(&contents, |name| env::var(name).ok())?;

		let mut config = match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Self::from_toml(&contents)?,
			Some("json") => Self::from_json(&contents)?,
			Some("yaml") | Some("yml") => Self::from_yaml(&contents)?,
			_ => anyhow::bail!("Unsupported config format: {:?}", path),
		};

		self.apply_env_overrides(&mut config, |name| env::var(name).ok())?;
		Self::validate_config(&config)?;
		Ok(config)
	}

	/// Load from TOML string
	pub fn from_toml(contents: &str) -> Result<ExchangeConfig> {
		toml::from_str(contents).map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))
	}

	/// Load from JSON string
	pub fn from_json(contents: &str) -> Result<ExchangeConfig> {
		serde_json::from_str(contents).context("Failed to parse JSON")
	}

	/// Load from YAML string
	pub fn from_yaml(contents: &str) -> Result<ExchangeConfig> {
		serde_yaml::from_str(contents).context("Failed to parse YAML")
	}

	/// Replaces every `${VAR}` in `content` with the value `lookup` returns.
	pub fn substitute_env_vars<F>(&self, content: &str, lookup: F) -> Result<String, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let re = Regex::new(r"\$\{([^}]+)\}")
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;

		let mut result = content.to_string();
		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let value = lookup(var_name)
				.ok_or_else(|| ConfigError::EnvVarNotFound(var_name.to_string()))?;
			result = result.replace(full_match, &value);
		}

		Ok(result)
	}

	/// Applies `<prefix>LOG_LEVEL`, `<prefix>CHAIN_ID` and
	/// `<prefix>STORAGE_PATH` overrides.
	pub fn apply_env_overrides<F>(
		&self,
		config: &mut ExchangeConfig,
		lookup: F,
	) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(level) = lookup(&format!("{}LOG_LEVEL", self.env_prefix)) {
			debug!("Overriding log level from environment");
			config.logging.level = level;
		}

		if let Some(chain_id) = lookup(&format!("{}CHAIN_ID", self.env_prefix)) {
			debug!("Overriding chain id from environment");
			config.exchange.chain_id = chain_id
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid chain id: {}", e)))?;
		}

		if let Some(path) = lookup(&format!("{}STORAGE_PATH", self.env_prefix)) {
			debug!("Overriding storage path from environment");
			let table = config.storage.as_table_mut().ok_or_else(|| {
				ConfigError::ValidationError("storage must be a table".to_string())
			})?;
			table.insert("path".to_string(), toml::Value::String(path));
		}

		Ok(())
	}

	/// Validate configuration
	pub fn validate_config(config: &ExchangeConfig) -> Result<(), ConfigError> {
		let exchange = &config.exchange;
		if exchange.name.is_empty() {
			return Err(ConfigError::ValidationError(
				"exchange name must not be empty".to_string(),
			));
		}
		if exchange.verifying_contract.is_zero() {
			return Err(ConfigError::ValidationError(
				"verifying_contract must not be the zero address".to_string(),
			));
		}
		if exchange.block_time_secs == 0 {
			return Err(ConfigError::ValidationError(
				"block_time_secs must be positive".to_string(),
			));
		}

		if !config.fees.is_valid() {
			return Err(ConfigError::ValidationError(format!(
				"protocol ({}) and operator ({}) fee rates exceed {} per mille",
				config.fees.protocol.rate_per_mille,
				config.fees.operator.rate_per_mille,
				FEE_DENOMINATOR
			)));
		}

		exchange_strategy::create_strategy_service(&config.strategies)
			.map_err(|e| ConfigError::ValidationError(e.to_string()))?;
		exchange_storage::create_storage(&config.storage)
			.map_err(|e| ConfigError::ValidationError(e.to_string()))?;

		Ok(())
	}
}
