//! Error types for the exchange system.
//!
//! Every exchange operation is all-or-nothing: any of these errors means the
//! operation left no observable effect.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExchangeError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
	/// Signature does not recover to the expected identity, or the caller is
	/// not the required principal.
	#[error("Unauthorized: {0}")]
	Unauthorized(String),

	/// Caller lacks the permission for this action.
	#[error("Forbidden: {0}")]
	Forbidden(String),

	/// A time bound has elapsed.
	#[error("Order expired at {expired_at}")]
	Expired { expired_at: u64 },

	/// Order already fully filled, cancelled or claimed.
	#[error("Sold out")]
	SoldOut,

	/// Cancellation attempted while a best bid is recorded.
	#[error("A bid already exists for this order")]
	BidExists,

	/// Asset cannot be settled through this exchange.
	#[error("Invalid exchange for asset {0}")]
	InvalidExchange(String),

	/// The sale strategy rejected the action.
	#[error("Strategy rejected the action: {0}")]
	Failure(String),

	/// A currency movement could not complete during settlement.
	#[error("Failed to transfer funds: {0}")]
	FailedToTransferFunds(String),

	/// The asset leg of a settlement could not complete.
	#[error("Failed to transfer asset: {0}")]
	FailedToTransferAsset(String),

	/// The ask itself is malformed.
	#[error("Invalid order: {0}")]
	InvalidOrder(String),

	#[error("Storage error: {0}")]
	Storage(String),
}
