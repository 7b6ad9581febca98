//! Sale strategy module for the exchange.
//!
//! A strategy decides whether a bid is acceptable right now and whether an
//! accumulated best bid may be claimed. Strategies are pure predicates: they
//! read the context they are given and never mutate anything. The matching
//! engine applies all state changes after a predicate says yes.

use alloy_primitives::{Address, U256};
use exchange_types::BestBid;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod params;

/// Re-export implementations
pub mod implementations {
	pub mod designated_sale;
	pub mod dutch_auction;
	pub mod english_auction;
	pub mod fixed_price;
}

pub use implementations::designated_sale::DesignatedSale;
pub use implementations::dutch_auction::DutchAuction;
pub use implementations::english_auction::EnglishAuction;
pub use implementations::fixed_price::FixedPrice;

/// Errors that can occur while configuring strategies.
#[derive(Debug, Error)]
pub enum StrategyError {
	#[error("Unknown strategy kind: {0}")]
	UnknownKind(String),
	#[error("Invalid strategy configuration: {0}")]
	InvalidConfig(String),
	#[error("Strategy address {0} registered twice")]
	Duplicate(Address),
}

/// The supported sale strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
	FixedPrice,
	EnglishAuction,
	DutchAuction,
	DesignatedSale,
}

impl StrategyKind {
	pub fn as_str(self) -> &'static str {
		match self {
			StrategyKind::FixedPrice => "fixed_price",
			StrategyKind::EnglishAuction => "english_auction",
			StrategyKind::DutchAuction => "dutch_auction",
			StrategyKind::DesignatedSale => "designated_sale",
		}
	}
}

impl fmt::Display for StrategyKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for StrategyKind {
	type Err = StrategyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"fixed_price" => Ok(StrategyKind::FixedPrice),
			"english_auction" => Ok(StrategyKind::EnglishAuction),
			"dutch_auction" => Ok(StrategyKind::DutchAuction),
			"designated_sale" => Ok(StrategyKind::DesignatedSale),
			other => Err(StrategyError::UnknownKind(other.to_string())),
		}
	}
}

/// Everything a strategy may look at when judging a bid.
#[derive(Debug, Clone, Copy)]
pub struct BidContext<'a> {
	/// Current unix time.
	pub now: u64,
	/// The ask's delegate.
	pub delegate: Option<Address>,
	/// The ask's deadline (inclusive).
	pub deadline: u64,
	/// The ask's strategy parameters.
	pub params: &'a [u8],
	pub currency: Address,
	/// Offered price.
	pub price: U256,
	/// Account that pays.
	pub bidder: Address,
	pub amount: U256,
	/// Destination of the asset.
	pub recipient: Address,
	/// Current best bid, if any.
	pub best_bid: Option<&'a BestBid>,
}

/// Everything a strategy may look at when judging a claim.
#[derive(Debug, Clone, Copy)]
pub struct ClaimContext<'a> {
	pub now: u64,
	pub delegate: Option<Address>,
	pub deadline: u64,
	pub params: &'a [u8],
	pub currency: Address,
	/// The bid that would settle.
	pub best_bid: Option<&'a BestBid>,
}

/// Trait defining the interface for sale strategies.
pub trait StrategyInterface: Send + Sync {
	/// Which strategy this is.
	fn kind(&self) -> StrategyKind;

	/// Whether an accepted bid settles at once rather than being recorded as
	/// the best bid for a later claim.
	fn settles_immediately(&self) -> bool;

	/// Whether the bid described by `ctx` is acceptable now.
	fn can_bid(&self, ctx: &BidContext<'_>) -> bool;

	/// Whether the recorded best bid may be settled now.
	fn can_claim(&self, ctx: &ClaimContext<'_>) -> bool;
}

/// Creates the strategy implementation for `kind`.
pub fn create_strategy(kind: StrategyKind) -> Box<dyn StrategyInterface> {
	match kind {
		StrategyKind::FixedPrice => Box::new(FixedPrice),
		StrategyKind::EnglishAuction => Box::new(EnglishAuction),
		StrategyKind::DutchAuction => Box::new(DutchAuction),
		StrategyKind::DesignatedSale => Box::new(DesignatedSale),
	}
}

/// Registry mapping strategy identities to their implementations.
#[derive(Default)]
pub struct StrategyService {
	strategies: HashMap<Address, Box<dyn StrategyInterface>>,
}

impl StrategyService {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `kind` under `address`.
	pub fn register(&mut self, address: Address, kind: StrategyKind) -> Result<(), StrategyError> {
		if self.strategies.contains_key(&address) {
			return Err(StrategyError::Duplicate(address));
		}
		tracing::debug!(%address, %kind, "Registered strategy");
		self.strategies.insert(address, create_strategy(kind));
		Ok(())
	}

	pub fn with_strategy(
		mut self,
		address: Address,
		kind: StrategyKind,
	) -> Result<Self, StrategyError> {
		self.register(address, kind)?;
		Ok(self)
	}

	/// Looks up the strategy an ask references.
	pub fn resolve(&self, address: &Address) -> Option<&dyn StrategyInterface> {
		self.strategies.get(address).map(|s| s.as_ref())
	}

	pub fn len(&self) -> usize {
		self.strategies.len()
	}

	pub fn is_empty(&self) -> bool {
		self.strategies.is_empty()
	}
}

/// Builds a registry from a table of named strategies.
///
/// Each entry needs:
/// - `kind`: one of `fixed_price`, `english_auction`, `dutch_auction`, `designated_sale`
/// - `address`: the strategy identity asks refer to
pub fn create_strategy_service(config: &toml::Value) -> Result<StrategyService, StrategyError> {
	let table = config
		.as_table()
		.ok_or_else(|| StrategyError::InvalidConfig("strategies must be a table".to_string()))?;

	let mut service = StrategyService::new();
	for (name, entry) in table {
		let kind = entry
			.get("kind")
			.and_then(|v| v.as_str())
			.ok_or_else(|| StrategyError::InvalidConfig(format!("{}: kind is required", name)))?
			.parse::<StrategyKind>()?;

		let address = entry
			.get("address")
			.and_then(|v| v.as_str())
			.ok_or_else(|| StrategyError::InvalidConfig(format!("{}: address is required", name)))?
			.parse::<Address>()
			.map_err(|e| StrategyError::InvalidConfig(format!("{}: invalid address: {}", name, e)))?;

		service.register(address, kind)?;
	}

	Ok(service)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_kind_round_trips_through_str() {
		for kind in [
			StrategyKind::FixedPrice,
			StrategyKind::EnglishAuction,
			StrategyKind::DutchAuction,
			StrategyKind::DesignatedSale,
		] {
			assert_eq!(kind.as_str().parse::<StrategyKind>().unwrap(), kind);
			assert_eq!(create_strategy(kind).kind(), kind);
		}
		assert!("vickrey".parse::<StrategyKind>().is_err());
	}

	#[test]
	fn test_service_from_config() {
		let config: toml::Value = toml::from_str(
			r#"
[fixed]
kind = "fixed_price"
address = "0x1111111111111111111111111111111111111111"

[english]
kind = "english_auction"
address = "0x2222222222222222222222222222222222222222"
"#,
		)
		.unwrap();

		let service = create_strategy_service(&config).unwrap();
		assert_eq!(service.len(), 2);

		let english = service.resolve(&Address::repeat_byte(0x22)).unwrap();
		assert_eq!(english.kind(), StrategyKind::EnglishAuction);
		assert!(!english.settles_immediately());
		assert!(service.resolve(&Address::repeat_byte(0x33)).is_none());
	}

	#[test]
	fn test_duplicate_address_is_rejected() {
		let result = StrategyService::new()
			.with_strategy(Address::repeat_byte(1), StrategyKind::FixedPrice)
			.and_then(|s| s.with_strategy(Address::repeat_byte(1), StrategyKind::DutchAuction));
		assert!(matches!(result, Err(StrategyError::Duplicate(_))));
	}

	#[test]
	fn test_missing_kind_is_rejected() {
		let config: toml::Value = toml::from_str(
			r#"
[broken]
address = "0x1111111111111111111111111111111111111111"
"#,
		)
		.unwrap();
		assert!(matches!(
			create_strategy_service(&config),
			Err(StrategyError::InvalidConfig(_))
		));
	}
}
