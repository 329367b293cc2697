//! History Store Port - Append-only slot summaries
//!
//! One immutable summary document per completed slot, keyed by an opaque
//! store-assigned identifier. Nothing updates or deletes a summary except
//! bulk administrative reset.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use txanda_core::SessionSummary;

/// Opaque key of a persisted summary
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SummaryId(pub String);

impl std::fmt::Display for SummaryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// History store error types
#[derive(thiserror::Error, Debug)]
pub enum HistoryStoreError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

/// History store port
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a summary and return its store-assigned key.
    async fn append(&self, summary: SessionSummary) -> Result<SummaryId, HistoryStoreError>;

    /// All persisted summaries, oldest first. Administrative read.
    async fn list(&self) -> Result<Vec<(SummaryId, SessionSummary)>, HistoryStoreError>;

    /// Bulk administrative reset. Returns the number of removed summaries.
    async fn clear(&self) -> Result<usize, HistoryStoreError>;
}
