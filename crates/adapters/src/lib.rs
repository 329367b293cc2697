//! Adapter Implementations
//!
//! Concrete implementations of the txanda ports: an in-memory document
//! store with broadcast change notification, an append-only in-memory
//! history store and the system/manual clocks.

pub mod clock;
pub mod memory_history;
pub mod memory_store;

pub use crate::clock::{ManualClock, SystemClock};
pub use crate::memory_history::InMemoryHistoryStore;
pub use crate::memory_store::InMemoryQueueStore;
