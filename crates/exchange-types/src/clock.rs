//! Ambient time for deadline checks.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the current time and block height.
pub trait Clock: Send + Sync {
	/// Current unix timestamp in seconds.
	fn timestamp(&self) -> u64;

	/// Current block number.
	fn block_number(&self) -> u64;
}

/// Wall clock. Block numbers are derived from a fixed block time.
#[derive(Debug, Clone)]
pub struct SystemClock {
	block_time_secs: u64,
}

impl SystemClock {
	pub fn new(block_time_secs: u64) -> Self {
		Self {
			block_time_secs: block_time_secs.max(1),
		}
	}
}

impl Default for SystemClock {
	fn default() -> Self {
		Self::new(12)
	}
}

impl Clock for SystemClock {
	fn timestamp(&self) -> u64 {
		chrono::Utc::now().timestamp().max(0) as u64
	}

	fn block_number(&self) -> u64 {
		self.timestamp() / self.block_time_secs
	}
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
	timestamp: AtomicU64,
	block: AtomicU64,
}

impl ManualClock {
	pub fn new(timestamp: u64) -> Self {
		Self {
			timestamp: AtomicU64::new(timestamp),
			block: AtomicU64::new(1),
		}
	}

	pub fn set(&self, timestamp: u64) {
		self.timestamp.store(timestamp, Ordering::SeqCst);
		self.block.fetch_add(1, Ordering::SeqCst);
	}

	/// Moves time forward by `secs` and mines one block.
	pub fn advance(&self, secs: u64) {
		self.timestamp.fetch_add(secs, Ordering::SeqCst);
		self.block.fetch_add(1, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn timestamp(&self) -> u64 {
		self.timestamp.load(Ordering::SeqCst)
	}

	fn block_number(&self) -> u64 {
		self.block.load(Ordering::SeqCst)
	}
}
