//! Signed order types for the exchange.
//!
//! An [`AskOrder`] is a seller's signed intent to sell units of an asset under
//! a sale strategy. A [`BidOrder`] is a buyer's signed offer against one ask,
//! used when a third party executes the bid on the buyer's behalf. Both are
//! immutable once signed; their EIP-712 struct hashes are derived from the
//! typed-data layouts declared below.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolStruct};
use serde::{Deserialize, Serialize};

/// Canonical identity of a signed order (its EIP-712 digest).
pub type OrderHash = B256;

// Typed-data layouts signed by sellers and buyers.
sol! {
	/// Seller intent as it is hashed and signed.
	struct Ask {
		address signer;
		address delegate;
		address asset;
		uint256 unitId;
		uint256 amount;
		address strategy;
		address currency;
		address feeRecipient;
		uint256 deadline;
		bytes params;
	}

	/// Buyer offer as it is hashed and signed.
	struct Bid {
		bytes32 askHash;
		address signer;
		uint256 amount;
		uint256 price;
		address recipient;
		address referrer;
	}
}

/// An asset unit: the asset contract plus the unit id within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId {
	/// Contract that owns the unit.
	pub contract: Address,
	/// Token id within the contract.
	pub unit_id: U256,
}

impl AssetId {
	pub fn new(contract: Address, unit_id: U256) -> Self {
		Self { contract, unit_id }
	}
}

/// Seller's signed ask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskOrder {
	/// Identity that authorised the ask and owns the asset.
	pub signer: Address,
	/// Address allowed to submit or approve bids for the seller.
	pub delegate: Option<Address>,
	/// Asset unit(s) offered.
	pub asset: AssetId,
	/// Number of units offered. Must be non-zero.
	pub amount: U256,
	/// Identity of the sale strategy governing this ask.
	pub strategy: Address,
	/// Payment currency.
	pub currency: Address,
	/// Receives the seller's net proceeds instead of `signer` when set.
	pub fee_recipient: Option<Address>,
	/// Absolute time bound (unix seconds, inclusive).
	pub deadline: u64,
	/// Strategy-specific ABI-encoded parameters.
	pub params: Bytes,
	/// 65-byte `r || s || v` signature over the ask digest.
	#[serde(default)]
	pub signature: Bytes,
}

impl AskOrder {
	/// Typed-data view of the ask used for hashing.
	pub fn typed(&self) -> Ask {
		Ask {
			signer: self.signer,
			delegate: self.delegate.unwrap_or(Address::ZERO),
			asset: self.asset.contract,
			unitId: self.asset.unit_id,
			amount: self.amount,
			strategy: self.strategy,
			currency: self.currency,
			feeRecipient: self.fee_recipient.unwrap_or(Address::ZERO),
			deadline: U256::from(self.deadline),
			params: self.params.clone(),
		}
	}

	/// EIP-712 `hashStruct` of the ask. The signature is not part of it.
	pub fn struct_hash(&self) -> B256 {
		self.typed().eip712_hash_struct()
	}

	/// Address credited with the seller's net proceeds.
	pub fn proceeds_recipient(&self) -> Address {
		self.fee_recipient.unwrap_or(self.signer)
	}

	/// Whether `who` is the ask's delegate.
	pub fn is_delegate(&self, who: Address) -> bool {
		self.delegate.is_some_and(|delegate| delegate == who)
	}

	/// Returns a copy of the ask carrying the given signature.
	pub fn with_signature(mut self, signature: Bytes) -> Self {
		self.signature = signature;
		self
	}
}

/// Buyer's signed bid, executed by the ask's delegate or an approved relayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidOrder {
	/// Hash of the ask this bid is for.
	pub ask_hash: OrderHash,
	/// Buyer; pays for the settlement.
	pub signer: Address,
	/// Units the buyer wants.
	pub amount: U256,
	/// Offered price (per unit on the multi-unit exchange).
	pub price: U256,
	/// Destination of the asset. Defaults to `signer`.
	pub recipient: Option<Address>,
	pub referrer: Option<Address>,
	#[serde(default)]
	pub signature: Bytes,
}

impl BidOrder {
	pub fn typed(&self) -> Bid {
		Bid {
			askHash: self.ask_hash,
			signer: self.signer,
			amount: self.amount,
			price: self.price,
			recipient: self.recipient.unwrap_or(Address::ZERO),
			referrer: self.referrer.unwrap_or(Address::ZERO),
		}
	}

	/// EIP-712 `hashStruct` of the bid.
	pub fn struct_hash(&self) -> B256 {
		self.typed().eip712_hash_struct()
	}

	/// Destination of the asset once the bid settles.
	pub fn asset_recipient(&self) -> Address {
		self.recipient.unwrap_or(self.signer)
	}

	pub fn with_signature(mut self, signature: Bytes) -> Self {
		self.signature = signature;
		self
	}
}
