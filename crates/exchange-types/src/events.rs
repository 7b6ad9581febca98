//! Observable records emitted on exchange state changes.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::OrderHash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeEvent {
	/// The signer withdrew an ask.
	Cancel { ask_hash: OrderHash, signer: Address },
	/// A bid became the best bid of an auction.
	Bid {
		ask_hash: OrderHash,
		bidder: Address,
		amount: U256,
		price: U256,
		recipient: Address,
		referrer: Option<Address>,
	},
	/// A match settled.
	Claim {
		ask_hash: OrderHash,
		bidder: Address,
		amount: U256,
		price: U256,
		recipient: Address,
		referrer: Option<Address>,
	},
	/// A delegate pinned the bid hash a relayer may execute.
	UpdateApprovedBidHash {
		delegate: Address,
		ask_hash: OrderHash,
		bidder: Address,
		bid_hash: B256,
	},
}

impl ExchangeEvent {
	pub fn ask_hash(&self) -> OrderHash {
		match self {
			ExchangeEvent::Cancel { ask_hash, .. }
			| ExchangeEvent::Bid { ask_hash, .. }
			| ExchangeEvent::Claim { ask_hash, .. }
			| ExchangeEvent::UpdateApprovedBidHash { ask_hash, .. } => *ask_hash,
		}
	}
}

/// Broadcast channel for exchange events.
pub struct EventBus {
	sender: broadcast::Sender<ExchangeEvent>,
}

impl EventBus {
	/// Creates a bus buffering up to `capacity` events per subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ExchangeEvent> {
		self.sender.subscribe()
	}

	/// Publishes to all current subscribers.
	///
	/// Fails only when nobody is subscribed, which callers treat as harmless.
	pub fn publish(
		&self,
		event: ExchangeEvent,
	) -> Result<(), broadcast::error::SendError<ExchangeEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}
