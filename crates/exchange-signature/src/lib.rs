//! Structured signature module for the exchange.
//!
//! Builds EIP-712 digests for asks and bids, verifies that a signature
//! recovers to the expected signer, and provides signing backends that
//! produce signed orders.

use alloy_primitives::{keccak256, Address, Bytes, PrimitiveSignature, B256};
use async_trait::async_trait;
use exchange_types::{AskOrder, BidOrder, ExchangeDomain, ExchangeError, OrderHash};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur while hashing, signing or verifying orders.
#[derive(Debug, Error)]
pub enum SignatureError {
	/// Signature bytes could not be parsed or recovered.
	#[error("Malformed signature: {0}")]
	Malformed(String),
	/// Signature recovered to someone other than the expected signer.
	#[error("Signature recovered to {recovered}, expected {expected}")]
	SignerMismatch { expected: Address, recovered: Address },
	/// Signing backend failed.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Key material is invalid.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

impl From<SignatureError> for ExchangeError {
	fn from(err: SignatureError) -> Self {
		ExchangeError::Unauthorized(err.to_string())
	}
}

/// EIP-712 digest: `keccak256(0x1901 || domainSeparator || structHash)`.
pub fn digest(domain: &ExchangeDomain, struct_hash: B256) -> B256 {
	let separator = domain.eip712().separator();
	let mut buf = [0u8; 66];
	buf[0] = 0x19;
	buf[1] = 0x01;
	buf[2..34].copy_from_slice(separator.as_slice());
	buf[34..66].copy_from_slice(struct_hash.as_slice());
	keccak256(buf)
}

/// Recovers the identity that signed `digest`.
///
/// Accepts 65-byte `r || s || v` signatures with `v` in {0, 1, 27, 28} and
/// rejects high-`s` (malleable) signatures.
pub fn recover(digest: B256, signature: &[u8]) -> Result<Address, SignatureError> {
	let signature = PrimitiveSignature::try_from(signature)
		.map_err(|e| SignatureError::Malformed(e.to_string()))?;

	if signature.normalize_s().is_some() {
		return Err(SignatureError::Malformed("non-canonical s value".to_string()));
	}

	signature
		.recover_address_from_prehash(&digest)
		.map_err(|e| SignatureError::Malformed(e.to_string()))
}

/// Checks that `signature` over `digest` recovers to `expected`.
pub fn verify(digest: B256, signature: &[u8], expected: Address) -> Result<(), SignatureError> {
	let recovered = recover(digest, signature)?;
	if recovered != expected || expected == Address::ZERO {
		return Err(SignatureError::SignerMismatch {
			expected,
			recovered,
		});
	}
	Ok(())
}

/// Hashes and verifies orders under one exchange domain.
#[derive(Debug, Clone)]
pub struct StructuredSignature {
	domain: ExchangeDomain,
}

impl StructuredSignature {
	pub fn new(domain: ExchangeDomain) -> Self {
		Self { domain }
	}

	pub fn domain(&self) -> &ExchangeDomain {
		&self.domain
	}

	/// Canonical identity of an ask.
	pub fn ask_hash(&self, ask: &AskOrder) -> OrderHash {
		digest(&self.domain, ask.struct_hash())
	}

	/// Canonical identity of a bid.
	pub fn bid_hash(&self, bid: &BidOrder) -> B256 {
		digest(&self.domain, bid.struct_hash())
	}

	/// Verifies the ask's signature and returns its hash.
	pub fn verify_ask(&self, ask: &AskOrder) -> Result<OrderHash, SignatureError> {
		let hash = self.ask_hash(ask);
		verify(hash, &ask.signature, ask.signer)?;
		Ok(hash)
	}

	/// Verifies the bid's signature and returns its hash.
	pub fn verify_bid(&self, bid: &BidOrder) -> Result<B256, SignatureError> {
		let hash = self.bid_hash(bid);
		verify(hash, &bid.signature, bid.signer)?;
		Ok(hash)
	}
}

/// Trait defining the interface for signing backends.
///
/// Implementations sign 32-byte prehashed digests and return 65-byte
/// `r || s || v` signatures.
#[async_trait]
pub trait SignerInterface: Send + Sync {
	/// Address the backend signs as.
	async fn address(&self) -> Result<Address, SignatureError>;

	/// Signs a prehashed digest.
	async fn sign_hash(&self, hash: &B256) -> Result<Bytes, SignatureError>;
}

/// Produces signed asks and bids with a signing backend.
pub struct SignerService {
	provider: Box<dyn SignerInterface>,
	structured: StructuredSignature,
}

impl SignerService {
	pub fn new(provider: Box<dyn SignerInterface>, domain: ExchangeDomain) -> Self {
		Self {
			provider,
			structured: StructuredSignature::new(domain),
		}
	}

	pub async fn address(&self) -> Result<Address, SignatureError> {
		self.provider.address().await
	}

	/// Signs an ask. The ask's `signer` must be the backend's address.
	pub async fn sign_ask(&self, ask: AskOrder) -> Result<AskOrder, SignatureError> {
		self.ensure_signer(ask.signer).await?;
		let signature = self.provider.sign_hash(&self.structured.ask_hash(&ask)).await?;
		Ok(ask.with_signature(signature))
	}

	/// Signs a bid. The bid's `signer` must be the backend's address.
	pub async fn sign_bid(&self, bid: BidOrder) -> Result<BidOrder, SignatureError> {
		self.ensure_signer(bid.signer).await?;
		let signature = self.provider.sign_hash(&self.structured.bid_hash(&bid)).await?;
		Ok(bid.with_signature(signature))
	}

	async fn ensure_signer(&self, claimed: Address) -> Result<(), SignatureError> {
		let address = self.provider.address().await?;
		if address != claimed {
			return Err(SignatureError::SignerMismatch {
				expected: claimed,
				recovered: address,
			});
		}
		Ok(())
	}
}
