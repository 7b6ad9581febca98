//! Fee configuration and the result of splitting a settlement price.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Denominator of every fee rate: rates are parts per thousand.
pub const FEE_DENOMINATOR: u64 = 1000;

/// A fee recipient and its rate in parts per thousand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRate {
	pub recipient: Address,
	pub rate_per_mille: u16,
}

impl FeeRate {
	pub fn new(recipient: Address, rate_per_mille: u16) -> Self {
		Self {
			recipient,
			rate_per_mille,
		}
	}
}

/// Live protocol and operator fee configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
	pub protocol: FeeRate,
	pub operator: FeeRate,
}

impl FeeConfig {
	/// Sum of the protocol and operator rates never exceeds the denominator.
	pub fn is_valid(&self) -> bool {
		u64::from(self.protocol.rate_per_mille) + u64::from(self.operator.rate_per_mille)
			<= FEE_DENOMINATOR
	}
}

/// Which amount the royalty rate is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoyaltyBasis {
	/// Royalty on the full gross price.
	Gross,
	/// Royalty on what remains after protocol and operator cuts.
	NetOfFees,
}

/// Outcome of splitting a gross price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeSplit {
	pub protocol_cut: U256,
	pub operator_cut: U256,
	pub royalty_cut: U256,
	pub seller_net: U256,
}

impl FeeSplit {
	pub fn total(&self) -> U256 {
		self.protocol_cut + self.operator_cut + self.royalty_cut + self.seller_net
	}
}
