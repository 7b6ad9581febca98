//! Storage module for the exchange system.
//!
//! This module provides a key/value abstraction over storage backends
//! (in-memory or file based) and the typed order store built on top of it,
//! which holds fill state, best bids, approved bid hashes and consumed bid
//! hashes for every ask.

use async_trait::async_trait;
use exchange_types::ExchangeError;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub mod order_store;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

pub use order_store::{OrderStore, OrderStoreTransaction};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Invalid backend configuration.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl From<StorageError> for ExchangeError {
	fn from(err: StorageError) -> Self {
		ExchangeError::Storage(err.to_string())
	}
}

/// Trait defining the low-level interface for storage backends.
///
/// Backends store opaque bytes under string keys. Typed access and key
/// layout live in [`StorageService`] and [`OrderStore`].
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, replacing any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key. Missing keys are not
	/// an error.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// High-level storage service that provides typed operations.
///
/// Values are JSON encoded and stored under `namespace:id` keys.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Like [`retrieve`](Self::retrieve) but maps a missing key to `None`.
	pub async fn retrieve_optional<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}

	/// Raw bytes under `namespace:id`, if any.
	pub(crate) async fn get_raw(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<Vec<u8>>, StorageError> {
		match self.backend.get_bytes(&Self::key(namespace, id)).await {
			Ok(bytes) => Ok(Some(bytes)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Writes raw bytes, or deletes the key when `value` is `None`.
	pub(crate) async fn put_raw(
		&self,
		namespace: &str,
		id: &str,
		value: Option<Vec<u8>>,
	) -> Result<(), StorageError> {
		let key = Self::key(namespace, id);
		match value {
			Some(bytes) => self.backend.set_bytes(&key, bytes).await,
			None => self.backend.delete(&key).await,
		}
	}
}

/// Factory function to create a storage backend from configuration.
///
/// Configuration parameters:
/// - `backend`: `memory` (default) or `file`
/// - `path`: base directory for file storage (default: "./data/exchange")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	let backend = config
		.get("backend")
		.and_then(|v| v.as_str())
		.unwrap_or("memory");

	match backend {
		"memory" => Ok(Box::new(implementations::memory::MemoryStorage::new())),
		"file" => Ok(implementations::file::create_storage(config)),
		other => Err(StorageError::Configuration(format!(
			"unknown storage backend '{}'",
			other
		))),
	}
}
