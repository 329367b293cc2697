//! Port Definitions
//!
//! Interfaces between the coordinator modules and the outside world: the
//! shared queue document store, the append-only history store and the
//! clock. Adapters implement these; modules depend only on the traits.

pub mod clock;
pub mod history_store;
pub mod queue_store;

pub use crate::clock::Clock;
pub use crate::history_store::{HistoryStore, HistoryStoreError, SummaryId};
pub use crate::queue_store::{QueueEvent, QueueEventReceiver, QueueStore, QueueStoreError};
