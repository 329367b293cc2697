//! Queue documents shared through the store
//!
//! Contains the value objects every coordinator instance reads and writes:
//! the waiting queue entries, the single active slot and the live control
//! value. Ordering of waiting entries is defined once here so that every
//! observing process ranks the queue identically.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier for a connected client session
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Generate a fresh anonymous session identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One waiting queue member
///
/// `joined_at` is store-assigned and monotone non-decreasing; `position` is
/// the denormalized 1-based rank, recomputed on every membership change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitingEntry {
    pub session_id: SessionId,
    pub joined_at: DateTime<Utc>,
    pub position: u32,
}

impl WaitingEntry {
    pub fn new(session_id: SessionId, joined_at: DateTime<Utc>, position: u32) -> Self {
        Self {
            session_id,
            joined_at,
            position,
        }
    }

    /// Total order of the waiting queue: ascending join time, ties broken
    /// by lexicographic session id. Every observer must use this key so
    /// concurrent activation attempts converge on the same candidate.
    pub fn order_key(&self) -> (DateTime<Utc>, &str) {
        (self.joined_at, self.session_id.as_str())
    }
}

/// The single active control slot
///
/// At most one of these exists at any instant; it lives at a single
/// document path, so concurrent activation writes collapse to one winner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSlot {
    pub session_id: SessionId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ActiveSlot {
    pub fn new(session_id: SessionId, start_time: DateTime<Utc>, slot_duration: Duration) -> Self {
        let end_time = start_time + chrono::Duration::milliseconds(slot_duration.as_millis() as i64);
        Self {
            session_id,
            start_time,
            end_time,
        }
    }

    /// Time left in the slot, derived at read time and clamped at zero.
    pub fn remaining_time(&self, now: DateTime<Utc>) -> Duration {
        (self.end_time - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }
}

/// The externally observed live control value
///
/// Written on every sampled tick of an active slot, consumed by the
/// display collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlValue {
    pub value: f64,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
}

/// Aggregated queue state for display and administration
///
/// `queue_length` is denormalized for display only; the waiting set itself
/// is the authoritative state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub active: Option<ActiveSlot>,
    pub waiting: Vec<WaitingEntry>,
    pub queue_length: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_remaining_time_reads_zero_at_deadline() {
        let slot = ActiveSlot::new(SessionId::new("a".to_string()), at(0), Duration::from_secs(30));

        assert_eq!(slot.end_time, at(30_000));
        assert_eq!(slot.remaining_time(at(30_000)), Duration::ZERO);
        assert_eq!(slot.remaining_time(at(45_000)), Duration::ZERO);
        assert_eq!(slot.remaining_time(at(29_000)), Duration::from_secs(1));
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let slot = ActiveSlot::new(SessionId::new("a".to_string()), at(0), Duration::from_secs(30));

        assert!(!slot.is_expired(at(29_999)));
        assert!(slot.is_expired(at(30_000)));
        assert!(slot.is_expired(at(30_001)));
    }

    #[test]
    fn test_order_key_sorts_by_join_time() {
        let a = WaitingEntry::new(SessionId::new("b".to_string()), at(100), 1);
        let b = WaitingEntry::new(SessionId::new("a".to_string()), at(200), 2);

        assert!(a.order_key() < b.order_key());
    }

    #[test]
    fn test_order_key_ties_break_on_session_id() {
        let a = WaitingEntry::new(SessionId::new("alpha".to_string()), at(100), 1);
        let b = WaitingEntry::new(SessionId::new("beta".to_string()), at(100), 2);

        assert!(a.order_key() < b.order_key());
    }

    #[test]
    fn test_session_id_display_roundtrip() {
        let id: SessionId = "client-42".parse().unwrap();
        assert_eq!(id.to_string(), "client-42");
    }

    #[test]
    fn test_generated_session_ids_are_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }
}
