//! Per-turn telemetry records
//!
//! Samples live only in the memory of the collecting process; the summary
//! is the single persisted artifact of a completed slot and is immutable
//! once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::SessionId;

/// One captured control-value sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Statistics over all captured samples of a slot
///
/// `std_deviation` is the population standard deviation (divide by N).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotStatistics {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub std_deviation: f64,
}

/// Write-once record of a completed slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub sample_count: usize,
    pub statistics: SlotStatistics,
    /// Fixed-stride subsample of the capture, bounding storage cost.
    pub sampled_history: Vec<SessionSample>,
}
