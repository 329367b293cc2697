//! In-memory history store adapter
//!
//! Append-only vector of summaries keyed by store-assigned uuids. Nothing
//! mutates a persisted summary; `clear` exists only for bulk
//! administrative reset.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use txanda_core::SessionSummary;
use txanda_ports::{HistoryStore, HistoryStoreError, SummaryId};

/// In-memory append-only summary store
#[derive(Default)]
pub struct InMemoryHistoryStore {
    summaries: RwLock<Vec<(SummaryId, SessionSummary)>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, summary: SessionSummary) -> Result<SummaryId, HistoryStoreError> {
        let id = SummaryId(uuid::Uuid::new_v4().to_string());
        let mut summaries = self.summaries.write().await;
        summaries.push((id.clone(), summary));
        debug!(summary_id = %id, total = summaries.len(), "Session summary appended");
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<(SummaryId, SessionSummary)>, HistoryStoreError> {
        Ok(self.summaries.read().await.clone())
    }

    async fn clear(&self) -> Result<usize, HistoryStoreError> {
        let mut summaries = self.summaries.write().await;
        let removed = summaries.len();
        summaries.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use txanda_core::{SessionId, SlotStatistics};

    fn summary(session: &str) -> SessionSummary {
        let now = Utc::now();
        SessionSummary {
            session_id: SessionId::new(session.to_string()),
            start_time: now,
            end_time: now,
            duration_ms: 30_000,
            sample_count: 4,
            statistics: SlotStatistics {
                average: 0.1,
                min: -0.4,
                max: 0.6,
                std_deviation: 0.36,
            },
            sampled_history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_append_assigns_unique_keys() {
        let store = InMemoryHistoryStore::new();

        let first = store.append(summary("a")).await.unwrap();
        let second = store.append(summary("b")).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_preserves_append_order() {
        let store = InMemoryHistoryStore::new();

        store.append(summary("first")).await.unwrap();
        store.append(summary("second")).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed[0].1.session_id.as_str(), "first");
        assert_eq!(listed[1].1.session_id.as_str(), "second");
    }

    #[tokio::test]
    async fn test_clear_reports_removed_count() {
        let store = InMemoryHistoryStore::new();
        store.append(summary("a")).await.unwrap();
        store.append(summary("b")).await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.list().await.unwrap().is_empty());
    }
}
