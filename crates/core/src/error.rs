//! Coordinator Error Taxonomy
//!
//! Centralized error classification shared by every layer. None of these
//! variants is fatal to a coordinator process: transport failures are
//! retried on the next observation, invalid records are skipped for the
//! tick, and permission failures only affect administrative paths.

/// Result type for coordinator operations
pub type CoordinatorResult<T> = std::result::Result<T, CoordinatorError>;

/// Main coordinator error enum
#[derive(thiserror::Error, Debug)]
pub enum CoordinatorError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid record at {path}: {reason}")]
    InvalidRecord { path: String, reason: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl CoordinatorError {
    /// Whether the caller should simply wait for the next scheduled
    /// observation instead of treating this as a hard failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Transport(_) | CoordinatorError::InvalidRecord { .. }
        )
    }
}
