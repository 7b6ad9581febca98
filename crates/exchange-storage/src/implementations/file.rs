//! File-based storage backend.
//!
//! Each key is stored as one JSON file under a base directory. Writes go to
//! a temporary file first and are renamed into place, so a reader never sees
//! a partially written value.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

/// File-based storage implementation.
///
/// Exchange state (fill records, best bids, consumed bid orders and delegate
/// approvals) lives as one file per key, so a rebuilt engine pointed at the
/// same directory picks up where the previous one stopped.
pub struct FileStorage {
	/// Base directory path for storing files. Created on the first write.
	base_path: PathBuf,
}

impl FileStorage {
	/// Creates a new FileStorage instance with the specified base path.
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	/// Converts a storage key to a filesystem-safe file path.
	///
	/// Keys look like `<namespace>:<hex id>`; separators are replaced with
	/// `_` and a `.json` extension is appended, matching the encoding the
	/// typed layer writes.
	fn get_file_path(&self, key: &str) -> PathBuf {
		// Sanitize key to be filesystem-safe
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.json", safe_key))
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	/// Reads the file for `key`. A missing file is `NotFound`.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);

		match fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		// Create the base directory on first use
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		// Write to a sibling temp file, then rename over the target
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	/// Removes the file for `key`. Deleting a missing key succeeds.
	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `path`: Base directory for file storage (default: "./data/exchange")
pub fn create_storage(config: &toml::Value) -> Box<dyn StorageInterface> {
	let storage_path = config
		.get("path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/exchange")
		.to_string();

	Box::new(FileStorage::new(PathBuf::from(storage_path)))
}
