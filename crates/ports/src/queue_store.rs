//! Queue Store Port - Shared mutable coordination state
//!
//! Typed read/write/subscribe operations over the hierarchical document
//! store every coordinator instance races on. No operation is transactional
//! across paths: a caller must never assume a read-then-write sequence is
//! atomic with respect to other writers. Failures mean "state unknown,
//! retry on the next observation", never a fatal condition.

use async_trait::async_trait;
use tokio::sync::broadcast;
use txanda_core::{ActiveSlot, ControlValue, SessionId, WaitingEntry};

/// Queue store error types
#[derive(thiserror::Error, Debug)]
pub enum QueueStoreError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid record at {path}: {reason}")]
    InvalidRecord { path: String, reason: String },

    #[error("Session already queued: {0}")]
    DuplicateSession(SessionId),
}

/// Change notification for a store path
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// The active-slot document was replaced (activation, skip rewrite,
    /// clear).
    ActiveChanged(Option<ActiveSlot>),

    /// Waiting-set membership or positions changed; carries the new size.
    WaitingChanged(usize),

    /// The denormalized queue length was rewritten.
    QueueLengthChanged(usize),

    /// A sampled control value was published.
    ControlValueChanged(ControlValue),
}

/// Subscription handle wrapper
///
/// Dropping the receiver detaches the subscription.
#[derive(Debug)]
pub struct QueueEventReceiver {
    pub receiver: broadcast::Receiver<QueueEvent>,
}

impl QueueEventReceiver {
    /// Receive the next change notification. Lagged gaps are skipped; the
    /// caller recovers the missed state on its next full observation.
    pub async fn recv(&mut self) -> Result<QueueEvent, QueueStoreError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(QueueStoreError::Transport("subscription closed".to_string()));
                }
            }
        }
    }

    pub fn try_recv(&mut self) -> Result<QueueEvent, QueueStoreError> {
        self.receiver
            .try_recv()
            .map_err(|e| QueueStoreError::Transport(e.to_string()))
    }
}

/// Queue store port
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Record a waiting entry for the session. The store assigns the
    /// monotone join timestamp; session ids must be unique in the set.
    async fn join(&self, session_id: &SessionId) -> Result<WaitingEntry, QueueStoreError>;

    /// Delete a waiting entry. Returns whether an entry existed.
    async fn leave(&self, session_id: &SessionId) -> Result<bool, QueueStoreError>;

    /// Waiting entries ordered by `(joined_at, session_id)`.
    async fn get_waiting(&self) -> Result<Vec<WaitingEntry>, QueueStoreError>;

    async fn get_active(&self) -> Result<Option<ActiveSlot>, QueueStoreError>;

    /// Replace the single active-slot document. Last write wins.
    async fn set_active(&self, slot: Option<ActiveSlot>) -> Result<(), QueueStoreError>;

    /// Overwrite the stored positions of the given entries. Entries no
    /// longer present in the waiting set are ignored.
    async fn update_positions(&self, entries: &[WaitingEntry]) -> Result<(), QueueStoreError>;

    async fn get_queue_length(&self) -> Result<usize, QueueStoreError>;

    async fn set_queue_length(&self, length: usize) -> Result<(), QueueStoreError>;

    /// Publish the live control value for the display collaborator.
    async fn publish_control_value(&self, value: ControlValue) -> Result<(), QueueStoreError>;

    async fn get_control_value(&self) -> Result<Option<ControlValue>, QueueStoreError>;

    async fn subscribe(&self) -> Result<QueueEventReceiver, QueueStoreError>;
}
