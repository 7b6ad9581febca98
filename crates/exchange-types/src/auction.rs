//! Per-order lifecycle state kept by the exchange.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::OrderHash;

/// Leading, not yet settled bid on an auction-type ask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestBid {
	/// Account that pays when the bid is claimed.
	pub bidder: Address,
	pub amount: U256,
	pub price: U256,
	/// Destination of the asset.
	pub recipient: Address,
	pub referrer: Option<Address>,
	/// Block at which the bid was accepted.
	pub recorded_at_block: u64,
}

/// Lifecycle of an ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
	/// Nothing settled yet.
	Open,
	/// Some units sold, some remain. Multi-unit exchange only.
	PartiallyFilled,
	/// Fully filled, or settled on the single-unit exchange.
	Exhausted,
	/// Withdrawn by the signer.
	Cancelled,
}

impl OrderStatus {
	/// Terminal states accept no further action.
	pub fn is_terminal(self) -> bool {
		matches!(self, OrderStatus::Exhausted | OrderStatus::Cancelled)
	}
}

/// Fill accounting for one ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillState {
	/// Cumulative units settled.
	pub amount_filled: U256,
	pub status: OrderStatus,
}

impl Default for FillState {
	fn default() -> Self {
		Self {
			amount_filled: U256::ZERO,
			status: OrderStatus::Open,
		}
	}
}

impl FillState {
	/// Units still available out of `ask_amount`.
	pub fn remaining(&self, ask_amount: U256) -> U256 {
		if self.status.is_terminal() {
			return U256::ZERO;
		}
		ask_amount.saturating_sub(self.amount_filled)
	}

	/// Whether the ask has been cancelled or settled to exhaustion.
	pub fn is_cancelled_or_claimed(&self) -> bool {
		self.status.is_terminal()
	}
}

/// Key of an approved-bid-hash entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalKey {
	/// The ask's delegate that set the approval.
	pub delegate: Address,
	pub ask_hash: OrderHash,
	/// Signer of the approved bid order.
	pub bidder: Address,
}

impl ApprovalKey {
	pub fn new(delegate: Address, ask_hash: OrderHash, bidder: Address) -> Self {
		Self {
			delegate,
			ask_hash,
			bidder,
		}
	}
}
