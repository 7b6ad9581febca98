//! Identity of an exchange instance.

use alloy_primitives::{Address, U256};
use alloy_sol_types::Eip712Domain;
use serde::{Deserialize, Serialize};

use crate::RoyaltyBasis;

/// The two exchange flavours sharing the matching engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeVariant {
	/// One settlement exhausts an ask.
	SingleUnit,
	/// Asks fill partially across many buyers.
	MultiUnit,
}

impl ExchangeVariant {
	pub fn royalty_basis(self) -> RoyaltyBasis {
		match self {
			ExchangeVariant::SingleUnit => RoyaltyBasis::NetOfFees,
			ExchangeVariant::MultiUnit => RoyaltyBasis::Gross,
		}
	}
}

/// EIP-712 domain orders are signed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeDomain {
	pub name: String,
	pub version: String,
	pub chain_id: u64,
	pub verifying_contract: Address,
}

impl ExchangeDomain {
	pub fn new(
		name: impl Into<String>,
		version: impl Into<String>,
		chain_id: u64,
		verifying_contract: Address,
	) -> Self {
		Self {
			name: name.into(),
			version: version.into(),
			chain_id,
			verifying_contract,
		}
	}

	pub fn eip712(&self) -> Eip712Domain {
		Eip712Domain::new(
			Some(self.name.clone().into()),
			Some(self.version.clone().into()),
			Some(U256::from(self.chain_id)),
			Some(self.verifying_contract),
			None,
		)
	}
}
