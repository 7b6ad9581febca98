//! Signing backend implementations for the exchange.
//!
//! This module provides a local private key wallet built on Alloy's signer,
//! used to produce signed asks and bids.

use crate::{SignatureError, SignerInterface};
use alloy_primitives::{Address, Bytes, B256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;

/// Local wallet implementation using Alloy's signer.
///
/// Keeps the private key in memory. Suitable for development, testing and
/// tooling that signs orders on behalf of a single account.
pub struct LocalWallet {
	/// The underlying Alloy signer that handles cryptographic operations.
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Creates a new LocalWallet from a hex-encoded private key.
	///
	/// The private key may be given with or without the 0x prefix.
	pub fn new(private_key_hex: &str) -> Result<Self, SignatureError> {
		let key = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);
		if key.len() != 64 || hex::decode(key).is_err() {
			return Err(SignatureError::InvalidKey(
				"Private key must be 64 hex characters (32 bytes)".to_string(),
			));
		}

		let signer = key
			.parse::<PrivateKeySigner>()
			.map_err(|e| SignatureError::InvalidKey(format!("Invalid private key: {}", e)))?;

		Ok(Self { signer })
	}

	/// Creates a wallet with a freshly generated key.
	pub fn random() -> Self {
		Self {
			signer: PrivateKeySigner::random(),
		}
	}

	/// Address of the wallet, available without awaiting.
	pub fn address_sync(&self) -> Address {
		self.signer.address()
	}
}

#[async_trait]
impl SignerInterface for LocalWallet {
	async fn address(&self) -> Result<Address, SignatureError> {
		Ok(self.signer.address())
	}

	async fn sign_hash(&self, hash: &B256) -> Result<Bytes, SignatureError> {
		let signature = self
			.signer
			.sign_hash(hash)
			.await
			.map_err(|e| SignatureError::SigningFailed(format!("Failed to sign hash: {}", e)))?;

		Ok(Bytes::copy_from_slice(&signature.as_bytes()))
	}
}

/// Factory function to create a signing backend from configuration.
///
/// Configuration parameters:
/// - `private_key`: hex-encoded 32-byte private key
pub fn create_signer(config: &toml::Value) -> Result<Box<dyn SignerInterface>, SignatureError> {
	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| SignatureError::InvalidKey("private_key is required".to_string()))?;

	Ok(Box::new(LocalWallet::new(private_key)?))
}
