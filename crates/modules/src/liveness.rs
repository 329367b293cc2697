//! Liveness Monitor Module
//!
//! A watchdog any connected process can run: periodically inspects the
//! shared state and forces advancement when the slot holder's time has
//! elapsed but no scheduler instance has advanced the queue, which is
//! what happens when the holder's process crashed or closed without
//! running its expiry callback. Polls at a coarser interval than the slot
//! timer; any number of monitors may run concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use txanda_ports::{Clock, HistoryStore, QueueStore};

use crate::scheduler::{SchedulerError, TurnScheduler};

/// Watchdog configuration
#[derive(Debug, Clone)]
pub struct LivenessMonitorConfig {
    /// Poll interval; seconds, not milliseconds. The holder's own timer
    /// is the fast path, this only bounds the staleness window.
    pub poll_interval: Duration,
}

impl Default for LivenessMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Recurring queue-advancement watchdog
pub struct LivenessMonitor<S, H, C>
where
    S: QueueStore + Send + Sync + 'static,
    H: HistoryStore + Send + Sync + 'static,
    C: Clock + Send + Sync + 'static,
{
    scheduler: TurnScheduler<S, H, C>,
    config: LivenessMonitorConfig,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S, H, C> LivenessMonitor<S, H, C>
where
    S: QueueStore + Send + Sync + 'static,
    H: HistoryStore + Send + Sync + 'static,
    C: Clock + Send + Sync + 'static,
{
    pub fn new(scheduler: TurnScheduler<S, H, C>, config: LivenessMonitorConfig) -> Self {
        Self {
            scheduler,
            config,
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Start the poll loop. Idempotent.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let scheduler = self.scheduler.clone();
        let running = self.running.clone();
        let interval = self.config.poll_interval;
        let handle = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                tokio::time::sleep(interval).await;
                if let Err(e) = scheduler.poll_once().await {
                    // Recoverable by design; the next poll observes again.
                    warn!("Watchdog observation failed: {}", e);
                }
            }
        });
        *self.task.lock().await = Some(handle);
        info!(interval_ms = interval.as_millis() as u64, "Liveness monitor started");
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        info!("Liveness monitor stopped");
    }

    /// One immediate observation, outside the periodic loop.
    pub async fn poll_now(&self) -> Result<(), SchedulerError> {
        self.scheduler.poll_once().await
    }
}
