//! Admin Control Surface Module
//!
//! Out-of-band mutations and aggregated reads for the operator console:
//! skip, remove, resets and history access. All scheduling behaviour is
//! delegated to the turn scheduler; this surface performs none of its
//! own. Core queue paths never require authorization; only history
//! operations can come back with a permission failure, which is surfaced
//! as a non-fatal warning.

use std::sync::Arc;

use tracing::{info, warn};

use txanda_core::{QueueSnapshot, SessionId, SessionSummary};
use txanda_ports::{Clock, HistoryStore, HistoryStoreError, QueueStore, SummaryId};

use crate::scheduler::{SchedulerError, TurnScheduler};

/// Administrative facade over the coordinator
pub struct AdminSurface<S, H, C>
where
    S: QueueStore + Send + Sync + 'static,
    H: HistoryStore + Send + Sync + 'static,
    C: Clock + Send + Sync + 'static,
{
    scheduler: TurnScheduler<S, H, C>,
    store: Arc<S>,
    history: Arc<H>,
}

impl<S, H, C> AdminSurface<S, H, C>
where
    S: QueueStore + Send + Sync + 'static,
    H: HistoryStore + Send + Sync + 'static,
    C: Clock + Send + Sync + 'static,
{
    pub fn new(scheduler: TurnScheduler<S, H, C>, store: Arc<S>, history: Arc<H>) -> Self {
        Self {
            scheduler,
            store,
            history,
        }
    }

    /// End the current holder's turn early via the normal expiry path.
    pub async fn skip(&self) -> Result<bool, SchedulerError> {
        self.scheduler.skip().await
    }

    /// Remove a session wherever it sits: holder or waiting entry.
    pub async fn remove(&self, session_id: &SessionId) -> Result<bool, SchedulerError> {
        self.scheduler.remove(session_id).await
    }

    /// Wipe the live queue state; persisted summaries are untouched.
    pub async fn reset_queue_only(&self) -> Result<(), SchedulerError> {
        // Waiting entries go first so the ActiveChanged notification finds
        // nothing left to activate.
        let waiting = self.store.get_waiting().await?;
        for entry in &waiting {
            self.store.leave(&entry.session_id).await?;
        }
        self.store.set_active(None).await?;
        self.store.set_queue_length(0).await?;
        info!(removed = waiting.len(), "Queue reset");
        Ok(())
    }

    /// Wipe the live queue state and the summary history.
    pub async fn reset_queue_and_history(&self) -> Result<(), SchedulerError> {
        self.reset_queue_only().await?;
        match self.history.clear().await {
            Ok(removed) => info!(removed = removed, "Session history cleared"),
            Err(HistoryStoreError::PermissionDenied(reason)) => {
                warn!("History reset not authorized: {}", reason);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Aggregated queue state for display.
    pub async fn queue_status(&self) -> Result<QueueSnapshot, SchedulerError> {
        self.scheduler.queue_snapshot().await
    }

    /// All persisted session summaries, oldest first.
    pub async fn history(&self) -> Result<Vec<(SummaryId, SessionSummary)>, SchedulerError> {
        match self.history.list().await {
            Ok(summaries) => Ok(summaries),
            Err(HistoryStoreError::PermissionDenied(reason)) => {
                warn!("History read not authorized: {}", reason);
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}
