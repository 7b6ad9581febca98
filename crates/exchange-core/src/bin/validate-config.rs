//! Configuration validation utility
//!
//! Usage: validate-config config/exchange.toml

use anyhow::{Context, Result};
use clap::Parser;
use exchange_config::{ConfigLoader, LoggingSettings};
use exchange_core::ExchangeBuilder;
use exchange_settlement::implementations::memory::{InMemoryAssets, InMemoryLedger};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "validate-config")]
#[command(about = "Validate an exchange configuration file", long_about = None)]
struct Cli {
	/// Configuration file (.toml, .json, .yaml)
	config: PathBuf,

	/// Log filter; defaults to `[logging].level` from the file
	#[arg(long)]
	log_level: Option<String>,

	/// Emit JSON log lines (also enabled by `[logging].json`)
	#[arg(long)]
	json: bool,
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let config = ConfigLoader::new()
		.from_file(&cli.config)
		.context("Failed to load configuration")?;
	let (log_level, json) = log_settings(&cli, &config.logging);
	setup_tracing(log_level, json);

	info!("Configuration loaded");
	println!("Exchange: {} v{}", config.exchange.name, config.exchange.version);
	println!("Chain id: {}", config.exchange.chain_id);
	println!("Variant: {:?}", config.exchange.variant);
	println!(
		"Fees: protocol {}‰ to {}, operator {}‰ to {}",
		config.fees.protocol.rate_per_mille,
		config.fees.protocol.recipient,
		config.fees.operator.rate_per_mille,
		config.fees.operator.recipient
	);
	println!("Managed assets: {}", config.exchange.managed_assets.len());

	let engine = ExchangeBuilder::new(config)
		.with_assets(Arc::new(InMemoryAssets::new()))
		.with_ledger(Arc::new(InMemoryLedger::new()))
		.build()
		.context("Failed to build exchange engine")?;

	println!("Engine built for {:?} exchange", engine.variant());
	println!("Configuration is valid");
	Ok(())
}

/// Command line flags win over the file's `[logging]` section.
fn log_settings<'a>(cli: &'a Cli, logging: &'a LoggingSettings) -> (&'a str, bool) {
	let level = cli.log_level.as_deref().unwrap_or(&logging.level);
	(level, cli.json || logging.json)
}

fn setup_tracing(log_level: &str, json: bool) {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	let registry = tracing_subscriber::registry().with(env_filter);
	if json {
		registry.with(tracing_subscriber::fmt::layer().json()).init();
	} else {
		registry.with(tracing_subscriber::fmt::layer()).init();
	}
}
