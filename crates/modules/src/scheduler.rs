//! Turn Scheduler Module
//!
//! The admission state machine: computes queue order, activates the
//! earliest waiting session, arms the slot deadline and finalizes
//! telemetry on expiry. The same logic runs redundantly inside every
//! connected process; there is no authoritative instance. Races over the
//! shared store are tolerated, not prevented: the active slot is a single
//! last-write-wins document, and slot ownership is verified against a
//! fresh read at finalization time before any summary is persisted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use txanda_core::{ActiveSlot, ControlValue, CoordinatorError, QueueSnapshot, SessionId, WaitingEntry};
use txanda_ports::{Clock, HistoryStore, HistoryStoreError, QueueEvent, QueueStore, QueueStoreError};

use crate::telemetry::{TelemetryCollector, TelemetryConfig};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct TurnSchedulerConfig {
    /// Fixed duration of one control slot.
    pub slot_duration: Duration,

    pub telemetry: TelemetryConfig,
}

impl Default for TurnSchedulerConfig {
    fn default() -> Self {
        Self {
            slot_duration: Duration::from_secs(30),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Observable phase of the admission state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// No active slot.
    Idle,
    /// A slot is active and a deadline is armed.
    Active,
    /// Between clearing an expired slot and committing the next activation.
    Advancing,
}

#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    #[error("Queue store error: {0}")]
    QueueStore(#[from] QueueStoreError),

    #[error("History store error: {0}")]
    HistoryStore(#[from] HistoryStoreError),
}

/// One coordinator instance, colocated with at most one client session
///
/// `local_session` is `None` for pure monitor/admin processes, which
/// advance the queue but never collect telemetry.
pub struct TurnScheduler<S, H, C>
where
    S: QueueStore + Send + Sync + 'static,
    H: HistoryStore + Send + Sync + 'static,
    C: Clock + Send + Sync + 'static,
{
    store: Arc<S>,
    history: Arc<H>,
    clock: Arc<C>,
    config: TurnSchedulerConfig,
    local_session: Option<SessionId>,
    phase: Arc<RwLock<SchedulerPhase>>,
    collector: Arc<RwLock<Option<TelemetryCollector>>>,
    deadline_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    sampler_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    event_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    running: Arc<AtomicBool>,
    sampling: Arc<AtomicBool>,
}

impl<S, H, C> TurnScheduler<S, H, C>
where
    S: QueueStore + Send + Sync + 'static,
    H: HistoryStore + Send + Sync + 'static,
    C: Clock + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<S>,
        history: Arc<H>,
        clock: Arc<C>,
        local_session: Option<SessionId>,
        config: TurnSchedulerConfig,
    ) -> Self {
        Self {
            store,
            history,
            clock,
            config,
            local_session,
            phase: Arc::new(RwLock::new(SchedulerPhase::Idle)),
            collector: Arc::new(RwLock::new(None)),
            deadline_task: Arc::new(Mutex::new(None)),
            sampler_task: Arc::new(Mutex::new(None)),
            event_task: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            sampling: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn local_session(&self) -> Option<&SessionId> {
        self.local_session.as_ref()
    }

    pub async fn phase(&self) -> SchedulerPhase {
        *self.phase.read().await
    }

    /// Subscribe to store changes and drive the state machine until
    /// `stop`. Resumes from persisted state first, so a freshly connected
    /// process re-arms its deadline from the stored `end_time` without
    /// replaying history.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut events = self.store.subscribe().await?;

        match self.store.get_active().await {
            Ok(Some(slot)) => self.sync_with_slot(slot).await,
            Ok(None) => {
                if let Err(e) = self.try_activate_next().await {
                    warn!("Initial activation attempt failed: {}", e);
                }
            }
            Err(e) => warn!("Initial state read failed: {}", e),
        }

        let this = self.clone();
        let handle = tokio::spawn(async move {
            while this.running.load(Ordering::SeqCst) {
                match events.recv().await {
                    Ok(event) => this.handle_event(event).await,
                    Err(e) => {
                        warn!("Queue subscription lost: {}", e);
                        break;
                    }
                }
            }
        });
        *self.event_task.lock().await = Some(handle);
        Ok(())
    }

    /// Stop observing. Never required for correctness: the liveness
    /// monitors of the remaining processes keep the queue advancing.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.sampling.store(false, Ordering::SeqCst);
        for task in [&self.event_task, &self.deadline_task, &self.sampler_task] {
            if let Some(handle) = task.lock().await.take() {
                handle.abort();
            }
        }
    }

    /// Join the queue. The store assigns the join timestamp; positions and
    /// the denormalized queue length are recomputed, and an activation
    /// attempt runs immediately in case the coordinator was idle.
    pub async fn join(&self, session_id: &SessionId) -> Result<WaitingEntry, SchedulerError> {
        let entry = self.store.join(session_id).await?;
        info!(session_id = %entry.session_id, "Session joined queue");
        self.recompute_positions().await?;
        self.try_activate_next().await?;
        Ok(entry)
    }

    /// Voluntarily leave the waiting set. Returns whether an entry existed.
    pub async fn leave(&self, session_id: &SessionId) -> Result<bool, SchedulerError> {
        let removed = self.store.leave(session_id).await?;
        if removed {
            info!(session_id = %session_id, "Session left queue");
            self.recompute_positions().await?;
        }
        Ok(removed)
    }

    /// Record the latest control value; it is captured on the next
    /// sampling tick.
    pub async fn update_control(&self, value: f64) {
        if let Some(collector) = self.collector.write().await.as_mut() {
            collector.update(value);
        }
    }

    /// Idle -> Active. Any instance may attempt this; concurrent attempts
    /// collapse to one winner on the single active-slot document and
    /// superseded attempts reconcile at finalization.
    pub async fn try_activate_next(&self) -> Result<Option<ActiveSlot>, SchedulerError> {
        if self.store.get_active().await?.is_some() {
            return Ok(None);
        }

        let waiting = self.valid_waiting().await?;
        let Some(next) = waiting.first() else {
            *self.phase.write().await = SchedulerPhase::Idle;
            return Ok(None);
        };

        let now = self.clock.now();
        let slot = ActiveSlot::new(next.session_id.clone(), now, self.config.slot_duration);
        self.store.set_active(Some(slot.clone())).await?;
        self.store.leave(&slot.session_id).await?;
        self.recompute_positions().await?;
        info!(
            session_id = %slot.session_id,
            end_time = %slot.end_time,
            "Activated next waiting session"
        );

        self.sync_with_slot(slot.clone()).await;
        Ok(Some(slot))
    }

    /// Active -> Idle/Active. Stops sampling, finalizes telemetry with the
    /// ownership check, clears the slot and immediately attempts the next
    /// activation.
    pub async fn handle_expiry(&self) -> Result<(), SchedulerError> {
        let Some(slot) = self.store.get_active().await? else {
            // Already cleared by another instance; just try to advance.
            self.try_activate_next().await?;
            return Ok(());
        };

        let now = self.clock.now();
        if !slot.is_expired(now) {
            // Timer raced a slot replacement; realign with the new deadline.
            self.sync_with_slot(slot).await;
            return Ok(());
        }

        *self.phase.write().await = SchedulerPhase::Advancing;
        self.finalize_telemetry().await?;
        self.store.set_active(None).await?;
        info!(session_id = %slot.session_id, "Slot expired, advancing queue");
        self.try_activate_next().await?;
        Ok(())
    }

    /// One watchdog observation: advance if the slot is missing or its
    /// time has elapsed. Safe to run concurrently in any number of
    /// processes.
    pub async fn poll_once(&self) -> Result<(), SchedulerError> {
        match self.store.get_active().await? {
            None => {
                self.try_activate_next().await?;
            }
            Some(slot) if slot.is_expired(self.clock.now()) => {
                self.handle_expiry().await?;
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Administrative skip: rewrite the deadline to now and let the normal
    /// expiry path finalize and advance. Never clears or re-activates
    /// directly.
    pub async fn skip(&self) -> Result<bool, SchedulerError> {
        let Some(mut slot) = self.store.get_active().await? else {
            return Ok(false);
        };
        slot.end_time = self.clock.now();
        self.store.set_active(Some(slot.clone())).await?;
        info!(session_id = %slot.session_id, "Skip requested, slot deadline rewritten");
        Ok(true)
    }

    /// Administrative removal: the active holder is skipped, a waiting
    /// entry is deleted with positions recomputed.
    pub async fn remove(&self, session_id: &SessionId) -> Result<bool, SchedulerError> {
        if let Some(slot) = self.store.get_active().await? {
            if slot.session_id == *session_id {
                return self.skip().await;
            }
        }
        let removed = self.store.leave(session_id).await?;
        if removed {
            info!(session_id = %session_id, "Session removed from queue");
            self.recompute_positions().await?;
        }
        Ok(removed)
    }

    /// Aggregated queue state for display and administration.
    pub async fn queue_snapshot(&self) -> Result<QueueSnapshot, SchedulerError> {
        Ok(QueueSnapshot {
            active: self.store.get_active().await?,
            waiting: self.store.get_waiting().await?,
            queue_length: self.store.get_queue_length().await?,
        })
    }

    async fn handle_event(&self, event: QueueEvent) {
        match event {
            QueueEvent::ActiveChanged(Some(slot)) => self.sync_with_slot(slot).await,
            QueueEvent::ActiveChanged(None) | QueueEvent::WaitingChanged(_) => {
                if let Err(e) = self.try_activate_next().await {
                    warn!("Activation attempt failed: {}", e);
                }
            }
            QueueEvent::QueueLengthChanged(_) | QueueEvent::ControlValueChanged(_) => {}
        }
    }

    /// Waiting entries in activation order, with malformed records skipped
    /// for this tick rather than failing the observation.
    async fn valid_waiting(&self) -> Result<Vec<WaitingEntry>, SchedulerError> {
        let mut waiting = self.store.get_waiting().await?;
        waiting.retain(|entry| {
            if entry.session_id.as_str().is_empty() {
                warn!("Ignoring waiting entry with empty session id");
                return false;
            }
            true
        });
        waiting.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        Ok(waiting)
    }

    /// Rewrite every waiting entry's 1-based rank and the denormalized
    /// queue length after a membership change.
    async fn recompute_positions(&self) -> Result<(), SchedulerError> {
        let mut waiting = self.valid_waiting().await?;
        for (rank, entry) in waiting.iter_mut().enumerate() {
            entry.position = rank as u32 + 1;
        }
        self.store.update_positions(&waiting).await?;
        self.store.set_queue_length(waiting.len()).await?;
        Ok(())
    }

    /// Align local timer and collector with an observed active slot.
    /// Re-arms the deadline from the persisted `end_time`, which is also
    /// how skip rewrites and reconnects take effect.
    // Returns a boxed `Send` future rather than an `async fn` to break the
    // async auto-trait inference cycle: this edge closes the recursion
    // sync_with_slot -> arm_deadline -> spawn(handle_expiry) ->
    // try_activate_next -> sync_with_slot. Type-erasing it at a signature
    // boundary lets the compiler resolve `Send` without cyclic inference.
    fn sync_with_slot(
        &self,
        slot: ActiveSlot,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            *self.phase.write().await = SchedulerPhase::Active;

            if self.local_session.as_ref() == Some(&slot.session_id) {
                let mut collector = self.collector.write().await;
                let fresh_slot = collector
                    .as_ref()
                    .map(|c| c.started_at() != slot.start_time || c.session_id() != &slot.session_id)
                    .unwrap_or(true);
                if fresh_slot {
                    *collector = Some(TelemetryCollector::start(
                        slot.session_id.clone(),
                        slot.start_time,
                        &self.config.telemetry,
                    ));
                    drop(collector);
                    debug!(session_id = %slot.session_id, "Telemetry collection started");
                    self.start_sampler().await;
                }
            }

            self.arm_deadline(&slot).await;
        })
    }

    /// Replace the local deadline task with one armed for the slot's
    /// persisted `end_time`.
    async fn arm_deadline(&self, slot: &ActiveSlot) {
        let mut guard = self.deadline_task.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }

        let wait = slot.remaining_time(self.clock.now());
        let this = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            if let Err(e) = this.handle_expiry().await {
                warn!("Slot expiry handling failed: {}", e);
            }
        });
        *guard = Some(handle);
    }

    async fn start_sampler(&self) {
        let mut guard = self.sampler_task.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }
        self.sampling.store(true, Ordering::SeqCst);

        let this = self.clone();
        let period = self.config.telemetry.sample_period;
        let handle = tokio::spawn(async move {
            while this.sampling.load(Ordering::SeqCst) {
                tokio::time::sleep(period).await;
                this.sample_once().await;
            }
        });
        *guard = Some(handle);
    }

    /// One pull-based sampling tick: capture the latest control value and
    /// publish it for the display collaborator.
    async fn sample_once(&self) {
        let published = {
            let mut collector = self.collector.write().await;
            let Some(collector) = collector.as_mut() else {
                return;
            };
            collector.sample_tick(self.clock.now()).map(|sample| ControlValue {
                value: sample.value,
                session_id: collector.session_id().clone(),
                timestamp: sample.timestamp,
            })
        };

        if let Some(value) = published {
            if let Err(e) = self.store.publish_control_value(value).await {
                // Recoverable; the next tick publishes again.
                debug!("Control value publish failed: {}", e);
            }
        }
    }

    /// Stop sampling and persist the summary, but only if the collector
    /// still owns the slot. Ownership is checked against a fresh read at
    /// commit time, so a collector superseded by a racing activation
    /// discards its buffer instead of persisting for the wrong session.
    async fn finalize_telemetry(&self) -> Result<(), SchedulerError> {
        self.sampling.store(false, Ordering::SeqCst);
        if let Some(handle) = self.sampler_task.lock().await.take() {
            handle.abort();
        }

        let Some(collector) = self.collector.write().await.take() else {
            return Ok(());
        };

        let current = self.store.get_active().await?;
        let owns_slot = current
            .as_ref()
            .map(|slot| slot.session_id == *collector.session_id())
            .unwrap_or(false);
        if !owns_slot {
            warn!(
                session_id = %collector.session_id(),
                "Discarding telemetry for superseded slot"
            );
            return Ok(());
        }

        match collector.finalize(self.clock.now()) {
            Some(summary) => {
                let id = self.history.append(summary).await?;
                info!(summary_id = %id, "Session summary persisted");
            }
            None => debug!("Slot ended with zero samples, nothing persisted"),
        }
        Ok(())
    }
}

impl<S, H, C> Clone for TurnScheduler<S, H, C>
where
    S: QueueStore + Send + Sync + 'static,
    H: HistoryStore + Send + Sync + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            history: self.history.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            local_session: self.local_session.clone(),
            phase: self.phase.clone(),
            collector: self.collector.clone(),
            deadline_task: self.deadline_task.clone(),
            sampler_task: self.sampler_task.clone(),
            event_task: self.event_task.clone(),
            running: self.running.clone(),
            sampling: self.sampling.clone(),
        }
    }
}

impl From<SchedulerError> for CoordinatorError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::QueueStore(QueueStoreError::Transport(reason)) => {
                CoordinatorError::Transport(reason)
            }
            SchedulerError::QueueStore(QueueStoreError::PermissionDenied(reason)) => {
                CoordinatorError::PermissionDenied(reason)
            }
            SchedulerError::QueueStore(QueueStoreError::InvalidRecord { path, reason }) => {
                CoordinatorError::InvalidRecord { path, reason }
            }
            SchedulerError::QueueStore(QueueStoreError::DuplicateSession(session_id)) => {
                CoordinatorError::Conflict(format!("session already queued: {}", session_id))
            }
            SchedulerError::HistoryStore(HistoryStoreError::Transport(reason)) => {
                CoordinatorError::Transport(reason)
            }
            SchedulerError::HistoryStore(HistoryStoreError::PermissionDenied(reason)) => {
                CoordinatorError::PermissionDenied(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txanda_adapters::{InMemoryHistoryStore, InMemoryQueueStore, ManualClock};

    type TestScheduler = TurnScheduler<InMemoryQueueStore, InMemoryHistoryStore, ManualClock>;

    struct Harness {
        store: Arc<InMemoryQueueStore>,
        history: Arc<InMemoryHistoryStore>,
        clock: Arc<ManualClock>,
    }

    impl Harness {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::at_epoch());
            Self {
                store: Arc::new(InMemoryQueueStore::new(clock.clone())),
                history: Arc::new(InMemoryHistoryStore::new()),
                clock,
            }
        }

        fn scheduler(&self, local_session: Option<&str>) -> TestScheduler {
            TurnScheduler::new(
                self.store.clone(),
                self.history.clone(),
                self.clock.clone(),
                local_session.map(|s| SessionId::new(s.to_string())),
                TurnSchedulerConfig::default(),
            )
        }
    }

    fn session(id: &str) -> SessionId {
        SessionId::new(id.to_string())
    }

    #[tokio::test]
    async fn test_activation_selects_earliest_join() {
        let h = Harness::new();
        let scheduler = h.scheduler(None);

        scheduler.join(&session("b")).await.unwrap();
        h.clock.advance(Duration::from_millis(100));
        scheduler.join(&session("a")).await.unwrap();

        let active = h.store.get_active().await.unwrap().unwrap();
        assert_eq!(active.session_id.as_str(), "b");
        assert_eq!(scheduler.phase().await, SchedulerPhase::Active);
    }

    #[tokio::test]
    async fn test_phase_returns_to_idle_when_queue_drains() {
        let h = Harness::new();
        let scheduler = h.scheduler(None);

        scheduler.join(&session("a")).await.unwrap();
        h.clock.advance(Duration::from_secs(31));
        scheduler.poll_once().await.unwrap();

        assert!(h.store.get_active().await.unwrap().is_none());
        assert_eq!(scheduler.phase().await, SchedulerPhase::Idle);
    }

    #[tokio::test]
    async fn test_positions_recomputed_after_activation() {
        let h = Harness::new();
        let scheduler = h.scheduler(None);

        for id in ["a", "b", "c"] {
            scheduler.join(&session(id)).await.unwrap();
            h.clock.advance(Duration::from_millis(100));
        }

        // "a" activated; "b" and "c" remain with 1-based ranks.
        let waiting = h.store.get_waiting().await.unwrap();
        assert_eq!(waiting.len(), 2);
        assert_eq!(waiting[0].session_id.as_str(), "b");
        assert_eq!(waiting[0].position, 1);
        assert_eq!(waiting[1].session_id.as_str(), "c");
        assert_eq!(waiting[1].position, 2);
        assert_eq!(h.store.get_queue_length().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_skip_rewrites_deadline_only() {
        let h = Harness::new();
        let scheduler = h.scheduler(None);

        scheduler.join(&session("a")).await.unwrap();
        let before = h.store.get_active().await.unwrap().unwrap();

        h.clock.advance(Duration::from_secs(5));
        assert!(scheduler.skip().await.unwrap());

        let after = h.store.get_active().await.unwrap().unwrap();
        assert_eq!(after.session_id, before.session_id);
        assert_eq!(after.start_time, before.start_time);
        assert_eq!(after.end_time, h.clock.now());
        assert!(after.is_expired(h.clock.now()));
    }

    #[tokio::test]
    async fn test_skip_with_no_active_slot_is_noop() {
        let h = Harness::new();
        let scheduler = h.scheduler(None);

        assert!(!scheduler.skip().await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_active_holder_behaves_as_skip() {
        let h = Harness::new();
        let scheduler = h.scheduler(None);

        scheduler.join(&session("a")).await.unwrap();
        scheduler.join(&session("b")).await.unwrap();

        assert!(scheduler.remove(&session("a")).await.unwrap());

        // Slot not cleared directly; it is expired for the next observer.
        let slot = h.store.get_active().await.unwrap().unwrap();
        assert_eq!(slot.session_id.as_str(), "a");
        assert!(slot.is_expired(h.clock.now()));

        scheduler.poll_once().await.unwrap();
        let slot = h.store.get_active().await.unwrap().unwrap();
        assert_eq!(slot.session_id.as_str(), "b");
    }

    #[tokio::test]
    async fn test_remove_waiting_entry_recomputes_positions() {
        let h = Harness::new();
        let scheduler = h.scheduler(None);

        for id in ["a", "b", "c", "d"] {
            scheduler.join(&session(id)).await.unwrap();
            h.clock.advance(Duration::from_millis(100));
        }

        assert!(scheduler.remove(&session("c")).await.unwrap());

        let waiting = h.store.get_waiting().await.unwrap();
        let ranked: Vec<(&str, u32)> = waiting
            .iter()
            .map(|e| (e.session_id.as_str(), e.position))
            .collect();
        assert_eq!(ranked, vec![("b", 1), ("d", 2)]);
    }

    #[tokio::test]
    async fn test_remove_unknown_session_returns_false() {
        let h = Harness::new();
        let scheduler = h.scheduler(None);

        assert!(!scheduler.remove(&session("ghost")).await.unwrap());
    }

    #[tokio::test]
    async fn test_monitor_instance_never_collects_telemetry() {
        let h = Harness::new();
        let scheduler = h.scheduler(None);

        scheduler.join(&session("a")).await.unwrap();
        scheduler.update_control(0.5).await;

        h.clock.advance(Duration::from_secs(31));
        scheduler.poll_once().await.unwrap();

        assert!(h.history.list().await.unwrap().is_empty());
    }
}
