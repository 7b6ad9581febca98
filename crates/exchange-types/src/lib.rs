//! Common types for the exchange system.
//!
//! Signed orders, per-order lifecycle state, fee configuration, the error
//! taxonomy returned by every exchange operation and the event records
//! emitted on state changes.

pub mod auction;
pub mod clock;
pub mod errors;
pub mod events;
pub mod exchange;
pub mod fees;
pub mod orders;

pub use alloy_primitives::{Address, Bytes, B256, U256};
pub use auction::*;
pub use clock::*;
pub use errors::*;
pub use events::*;
pub use exchange::*;
pub use fees::*;
pub use orders::*;
