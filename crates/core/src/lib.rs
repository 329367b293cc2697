//! Core domain model for the txanda turn coordinator
//!
//! Contains the documents shared through the queue store, the per-turn
//! telemetry records and the shared error taxonomy.

pub mod error;
pub mod summary;
pub mod types;

pub use crate::error::{CoordinatorError, CoordinatorResult};
pub use crate::summary::{SessionSample, SessionSummary, SlotStatistics};
pub use crate::types::{ActiveSlot, ControlValue, QueueSnapshot, SessionId, WaitingEntry};
