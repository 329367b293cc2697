//! In-memory queue store adapter
//!
//! Emulates the shared hierarchical document store: one lock per document
//! path, last write wins per path, and no atomicity across paths: a
//! read-then-write sequence here races other writers exactly as it would
//! against the remote store. Every mutation publishes a change
//! notification on a broadcast channel.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use txanda_core::{ActiveSlot, ControlValue, SessionId, WaitingEntry};
use txanda_ports::{Clock, QueueEvent, QueueEventReceiver, QueueStore, QueueStoreError};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// In-memory queue document store with change notification
pub struct InMemoryQueueStore {
    active: RwLock<Option<ActiveSlot>>,
    waiting: RwLock<HashMap<SessionId, WaitingEntry>>,
    queue_length: RwLock<usize>,
    control_value: RwLock<Option<ControlValue>>,
    last_join: RwLock<Option<DateTime<Utc>>>,
    events: broadcast::Sender<QueueEvent>,
    clock: Arc<dyn Clock>,
}

impl InMemoryQueueStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            active: RwLock::new(None),
            waiting: RwLock::new(HashMap::new()),
            queue_length: RwLock::new(0),
            control_value: RwLock::new(None),
            last_join: RwLock::new(None),
            events,
            clock,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn notify(&self, event: QueueEvent) {
        // No subscribers is fine; mutations never fail for lack of them.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn join(&self, session_id: &SessionId) -> Result<WaitingEntry, QueueStoreError> {
        let mut waiting = self.waiting.write().await;
        if waiting.contains_key(session_id) {
            return Err(QueueStoreError::DuplicateSession(session_id.clone()));
        }

        // Store-assigned join timestamp, forced monotone non-decreasing so
        // FIFO order survives a coarse clock.
        let mut last_join = self.last_join.write().await;
        let now = self.clock.now();
        let joined_at = match *last_join {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        *last_join = Some(joined_at);
        drop(last_join);

        let entry = WaitingEntry::new(session_id.clone(), joined_at, waiting.len() as u32 + 1);
        waiting.insert(session_id.clone(), entry.clone());
        let size = waiting.len();
        drop(waiting);

        debug!(session_id = %entry.session_id, "Waiting entry recorded");
        self.notify(QueueEvent::WaitingChanged(size));
        Ok(entry)
    }

    async fn leave(&self, session_id: &SessionId) -> Result<bool, QueueStoreError> {
        let mut waiting = self.waiting.write().await;
        let removed = waiting.remove(session_id).is_some();
        let size = waiting.len();
        drop(waiting);

        if removed {
            self.notify(QueueEvent::WaitingChanged(size));
        }
        Ok(removed)
    }

    async fn get_waiting(&self) -> Result<Vec<WaitingEntry>, QueueStoreError> {
        let waiting = self.waiting.read().await;
        let mut entries: Vec<WaitingEntry> = waiting.values().cloned().collect();
        entries.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        Ok(entries)
    }

    async fn get_active(&self) -> Result<Option<ActiveSlot>, QueueStoreError> {
        Ok(self.active.read().await.clone())
    }

    async fn set_active(&self, slot: Option<ActiveSlot>) -> Result<(), QueueStoreError> {
        *self.active.write().await = slot.clone();
        self.notify(QueueEvent::ActiveChanged(slot));
        Ok(())
    }

    async fn update_positions(&self, entries: &[WaitingEntry]) -> Result<(), QueueStoreError> {
        let mut waiting = self.waiting.write().await;
        let mut changed = false;
        for entry in entries {
            if let Some(stored) = waiting.get_mut(&entry.session_id) {
                if stored.position != entry.position {
                    stored.position = entry.position;
                    changed = true;
                }
            }
        }
        let size = waiting.len();
        drop(waiting);

        if changed {
            self.notify(QueueEvent::WaitingChanged(size));
        }
        Ok(())
    }

    async fn get_queue_length(&self) -> Result<usize, QueueStoreError> {
        Ok(*self.queue_length.read().await)
    }

    async fn set_queue_length(&self, length: usize) -> Result<(), QueueStoreError> {
        let mut stored = self.queue_length.write().await;
        if *stored != length {
            *stored = length;
            drop(stored);
            self.notify(QueueEvent::QueueLengthChanged(length));
        }
        Ok(())
    }

    async fn publish_control_value(&self, value: ControlValue) -> Result<(), QueueStoreError> {
        *self.control_value.write().await = Some(value.clone());
        self.notify(QueueEvent::ControlValueChanged(value));
        Ok(())
    }

    async fn get_control_value(&self) -> Result<Option<ControlValue>, QueueStoreError> {
        Ok(self.control_value.read().await.clone())
    }

    async fn subscribe(&self) -> Result<QueueEventReceiver, QueueStoreError> {
        Ok(QueueEventReceiver {
            receiver: self.events.subscribe(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn store_with_clock() -> (Arc<InMemoryQueueStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch());
        let store = Arc::new(InMemoryQueueStore::new(clock.clone()));
        (store, clock)
    }

    fn session(id: &str) -> SessionId {
        SessionId::new(id.to_string())
    }

    #[tokio::test]
    async fn test_join_rejects_duplicate_session() {
        let (store, _clock) = store_with_clock();

        store.join(&session("a")).await.unwrap();
        let err = store.join(&session("a")).await.unwrap_err();

        assert!(matches!(err, QueueStoreError::DuplicateSession(_)));
    }

    #[tokio::test]
    async fn test_waiting_ordered_by_join_time() {
        let (store, clock) = store_with_clock();

        store.join(&session("c")).await.unwrap();
        clock.advance(Duration::from_millis(100));
        store.join(&session("a")).await.unwrap();
        clock.advance(Duration::from_millis(100));
        store.join(&session("b")).await.unwrap();

        let waiting = store.get_waiting().await.unwrap();
        let ids: Vec<&str> = waiting.iter().map(|e| e.session_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_identical_timestamps_tie_break_on_session_id() {
        let (store, _clock) = store_with_clock();

        // Clock never advances: all joins collide on the same timestamp.
        store.join(&session("delta")).await.unwrap();
        store.join(&session("alpha")).await.unwrap();
        store.join(&session("charlie")).await.unwrap();

        let waiting = store.get_waiting().await.unwrap();
        let ids: Vec<&str> = waiting.iter().map(|e| e.session_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "charlie", "delta"]);
    }

    #[tokio::test]
    async fn test_join_timestamps_monotone_under_clock_regression() {
        let (store, clock) = store_with_clock();

        clock.advance(Duration::from_secs(10));
        let first = store.join(&session("a")).await.unwrap();

        clock.set(DateTime::<Utc>::UNIX_EPOCH);
        let second = store.join(&session("b")).await.unwrap();

        assert!(second.joined_at >= first.joined_at);
    }

    #[tokio::test]
    async fn test_active_slot_last_write_wins() {
        let (store, clock) = store_with_clock();
        let now = clock.now();

        let slot_a = ActiveSlot::new(session("a"), now, Duration::from_secs(30));
        let slot_b = ActiveSlot::new(session("b"), now, Duration::from_secs(30));

        store.set_active(Some(slot_a)).await.unwrap();
        store.set_active(Some(slot_b.clone())).await.unwrap();

        assert_eq!(store.get_active().await.unwrap(), Some(slot_b));
    }

    #[tokio::test]
    async fn test_update_positions_ignores_departed_entries() {
        let (store, _clock) = store_with_clock();

        store.join(&session("a")).await.unwrap();
        let mut entries = store.get_waiting().await.unwrap();
        entries.push(WaitingEntry::new(session("ghost"), entries[0].joined_at, 7));
        entries[0].position = 3;

        store.update_positions(&entries).await.unwrap();

        let waiting = store.get_waiting().await.unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].position, 3);
    }

    #[tokio::test]
    async fn test_mutations_notify_subscribers() {
        let (store, _clock) = store_with_clock();
        let mut events = store.subscribe().await.unwrap();

        store.join(&session("a")).await.unwrap();
        match events.recv().await.unwrap() {
            QueueEvent::WaitingChanged(size) => assert_eq!(size, 1),
            other => panic!("unexpected event: {:?}", other),
        }

        store.set_active(None).await.unwrap();
        match events.recv().await.unwrap() {
            QueueEvent::ActiveChanged(None) => {}
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
