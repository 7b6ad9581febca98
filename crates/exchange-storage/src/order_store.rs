//! Typed per-ask lifecycle state.
//!
//! Every mutation goes through an [`OrderStoreTransaction`]: changes are
//! staged in memory, read back through the transaction, and written to the
//! backend only on [`commit`](OrderStoreTransaction::commit). Dropping a
//! transaction discards its changes.

use crate::{implementations::memory::MemoryStorage, StorageError, StorageService};
use exchange_types::{
	ApprovalKey, BestBid, ExchangeError, FillState, OrderHash, OrderStatus, B256, U256,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

const FILLS: &str = "fill";
const BEST_BIDS: &str = "best_bid";
const APPROVALS: &str = "approval";
const CONSUMED_BIDS: &str = "consumed_bid";

fn hash_id(hash: &B256) -> String {
	format!("{:x}", hash)
}

fn approval_id(key: &ApprovalKey) -> String {
	format!("{:x}-{:x}-{:x}", key.delegate, key.ask_hash, key.bidder)
}

/// Persistent state for every ask the exchange has seen.
pub struct OrderStore {
	storage: StorageService,
}

impl OrderStore {
	pub fn new(storage: StorageService) -> Self {
		Self { storage }
	}

	/// Store backed by process memory.
	pub fn in_memory() -> Self {
		Self::new(StorageService::new(Box::new(MemoryStorage::new())))
	}

	/// Fill state of an ask; asks never acted on are `Open` with nothing filled.
	pub async fn get_fill(&self, ask_hash: &OrderHash) -> Result<FillState, StorageError> {
		Ok(self
			.storage
			.retrieve_optional(FILLS, &hash_id(ask_hash))
			.await?
			.unwrap_or_default())
	}

	pub async fn get_best_bid(&self, ask_hash: &OrderHash) -> Result<Option<BestBid>, StorageError> {
		self.storage
			.retrieve_optional(BEST_BIDS, &hash_id(ask_hash))
			.await
	}

	pub async fn get_approved_bid_hash(
		&self,
		key: &ApprovalKey,
	) -> Result<Option<B256>, StorageError> {
		self.storage
			.retrieve_optional(APPROVALS, &approval_id(key))
			.await
	}

	/// Whether a bid order with this hash has been used, either by a
	/// settlement or as a recorded best bid.
	pub async fn is_bid_consumed(&self, bid_hash: &B256) -> Result<bool, StorageError> {
		self.storage.exists(CONSUMED_BIDS, &hash_id(bid_hash)).await
	}

	/// Starts staging changes.
	pub fn transaction(&self) -> OrderStoreTransaction<'_> {
		OrderStoreTransaction {
			storage: &self.storage,
			writes: Vec::new(),
		}
	}
}

struct StagedWrite {
	namespace: &'static str,
	id: String,
	/// `None` deletes the key.
	value: Option<Vec<u8>>,
}

/// A set of staged order store changes.
pub struct OrderStoreTransaction<'a> {
	storage: &'a StorageService,
	writes: Vec<StagedWrite>,
}

impl<'a> OrderStoreTransaction<'a> {
	async fn read<T: DeserializeOwned>(
		&self,
		namespace: &'static str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		let staged = self
			.writes
			.iter()
			.find(|w| w.namespace == namespace && w.id == id);

		match staged {
			Some(write) => write
				.value
				.as_deref()
				.map(|bytes| serde_json::from_slice::<T>(bytes))
				.transpose()
				.map_err(|e| StorageError::Serialization(e.to_string())),
			None => self.storage.retrieve_optional(namespace, id).await,
		}
	}

	fn write<T: Serialize>(
		&mut self,
		namespace: &'static str,
		id: String,
		value: Option<&T>,
	) -> Result<(), StorageError> {
		let value = value
			.map(serde_json::to_vec)
			.transpose()
			.map_err(|e| StorageError::Serialization(e.to_string()))?;

		self.writes
			.retain(|w| !(w.namespace == namespace && w.id == id));
		self.writes.push(StagedWrite {
			namespace,
			id,
			value,
		});
		Ok(())
	}

	pub async fn get_fill(&self, ask_hash: &OrderHash) -> Result<FillState, ExchangeError> {
		Ok(self
			.read(FILLS, &hash_id(ask_hash))
			.await?
			.unwrap_or_default())
	}

	/// Adds `units` to the cumulative fill of an ask offering `ask_amount`.
	///
	/// Fails `SoldOut` when the ask is cancelled or exhausted, or when the
	/// fill would exceed `ask_amount`.
	pub async fn add_fill(
		&mut self,
		ask_hash: &OrderHash,
		ask_amount: U256,
		units: U256,
	) -> Result<FillState, ExchangeError> {
		let mut fill = self.get_fill(ask_hash).await?;
		if fill.is_cancelled_or_claimed() {
			return Err(ExchangeError::SoldOut);
		}
		if units.is_zero() {
			return Err(ExchangeError::Failure("fill of zero units".to_string()));
		}

		let filled = fill
			.amount_filled
			.checked_add(units)
			.filter(|filled| *filled <= ask_amount)
			.ok_or(ExchangeError::SoldOut)?;

		fill.amount_filled = filled;
		fill.status = if filled == ask_amount {
			OrderStatus::Exhausted
		} else {
			OrderStatus::PartiallyFilled
		};
		self.write(FILLS, hash_id(ask_hash), Some(&fill))?;
		Ok(fill)
	}

	/// Marks a single-unit ask as settled.
	pub async fn mark_claimed(
		&mut self,
		ask_hash: &OrderHash,
		ask_amount: U256,
	) -> Result<FillState, ExchangeError> {
		let fill = self.get_fill(ask_hash).await?;
		if fill.is_cancelled_or_claimed() {
			return Err(ExchangeError::SoldOut);
		}

		let fill = FillState {
			amount_filled: ask_amount,
			status: OrderStatus::Exhausted,
		};
		self.write(FILLS, hash_id(ask_hash), Some(&fill))?;
		Ok(fill)
	}

	/// Moves an ask to `Cancelled`.
	///
	/// Fails `SoldOut` on a terminal ask and `BidExists` while a best bid is
	/// recorded.
	pub async fn cancel(&mut self, ask_hash: &OrderHash) -> Result<(), ExchangeError> {
		let mut fill = self.get_fill(ask_hash).await?;
		if fill.is_cancelled_or_claimed() {
			return Err(ExchangeError::SoldOut);
		}
		if self.get_best_bid(ask_hash).await?.is_some() {
			return Err(ExchangeError::BidExists);
		}

		fill.status = OrderStatus::Cancelled;
		self.write(FILLS, hash_id(ask_hash), Some(&fill))?;
		Ok(())
	}

	pub async fn get_best_bid(&self, ask_hash: &OrderHash) -> Result<Option<BestBid>, ExchangeError> {
		Ok(self.read(BEST_BIDS, &hash_id(ask_hash)).await?)
	}

	/// Records `bid` as the best bid. Its price must be strictly higher than
	/// the current best bid's, otherwise this fails `Failure`.
	pub async fn set_best_bid(
		&mut self,
		ask_hash: &OrderHash,
		bid: BestBid,
	) -> Result<(), ExchangeError> {
		if self.get_fill(ask_hash).await?.is_cancelled_or_claimed() {
			return Err(ExchangeError::SoldOut);
		}
		if let Some(current) = self.get_best_bid(ask_hash).await? {
			if bid.price <= current.price {
				return Err(ExchangeError::Failure(format!(
					"bid price {} does not exceed best bid {}",
					bid.price, current.price
				)));
			}
		}

		self.write(BEST_BIDS, hash_id(ask_hash), Some(&bid))?;
		Ok(())
	}

	pub fn clear_best_bid(&mut self, ask_hash: &OrderHash) -> Result<(), ExchangeError> {
		self.write::<BestBid>(BEST_BIDS, hash_id(ask_hash), None)?;
		Ok(())
	}

	pub async fn get_approved_bid_hash(
		&self,
		key: &ApprovalKey,
	) -> Result<Option<B256>, ExchangeError> {
		Ok(self.read(APPROVALS, &approval_id(key)).await?)
	}

	/// Overwrites any prior approval under `key`.
	pub fn set_approved_bid_hash(
		&mut self,
		key: &ApprovalKey,
		bid_hash: B256,
	) -> Result<(), ExchangeError> {
		self.write(APPROVALS, approval_id(key), Some(&bid_hash))?;
		Ok(())
	}

	pub fn clear_approved_bid_hash(&mut self, key: &ApprovalKey) -> Result<(), ExchangeError> {
		self.write::<B256>(APPROVALS, approval_id(key), None)?;
		Ok(())
	}

	pub async fn is_bid_consumed(&self, bid_hash: &B256) -> Result<bool, ExchangeError> {
		Ok(self
			.read::<bool>(CONSUMED_BIDS, &hash_id(bid_hash))
			.await?
			.unwrap_or(false))
	}

	/// Records that a bid order settled. A bid can be consumed once.
	pub async fn consume_bid(&mut self, bid_hash: &B256) -> Result<(), ExchangeError> {
		if self.is_bid_consumed(bid_hash).await? {
			return Err(ExchangeError::SoldOut);
		}
		self.write(CONSUMED_BIDS, hash_id(bid_hash), Some(&true))?;
		Ok(())
	}

	/// Number of staged writes.
	pub fn len(&self) -> usize {
		self.writes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.writes.is_empty()
	}

	/// Writes every staged change to the backend.
	///
	/// If a write fails, the writes already applied are restored to their
	/// previous values before the error is returned.
	pub async fn commit(self) -> Result<(), StorageError> {
		let mut applied: Vec<(&'static str, String, Option<Vec<u8>>)> =
			Vec::with_capacity(self.writes.len());

		for write in self.writes {
			let result = match self.storage.get_raw(write.namespace, &write.id).await {
				Ok(previous) => self
					.storage
					.put_raw(write.namespace, &write.id, write.value)
					.await
					.map(|_| previous),
				Err(e) => Err(e),
			};

			match result {
				Ok(previous) => applied.push((write.namespace, write.id, previous)),
				Err(e) => {
					for (namespace, id, previous) in applied.into_iter().rev() {
						if let Err(restore_err) = self.storage.put_raw(namespace, &id, previous).await
						{
							warn!(
								key = %format!("{}:{}", namespace, id),
								error = %restore_err,
								"Failed to restore order store entry"
							);
						}
					}
					return Err(e);
				}
			}
		}

		Ok(())
	}
}
