//! Configuration for the exchange.
//!
//! Exchange identity, fee rates, registered strategies, storage backend and
//! logging, loaded from TOML, JSON or YAML files with `${VAR}` substitution
//! and `EXCHANGE_*` environment overrides.

use thiserror::Error;

pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),
}
