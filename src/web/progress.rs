// In-memory download progress store.
//
// One store is constructed at startup and handed to everything that needs it;
// there is no global. Reads go through `snapshot()`, which returns the same
// `Arc` until the next mutation, so callers can cheaply detect "nothing
// changed" with `Arc::ptr_eq`. Subscribers get the fresh snapshot pushed
// after every mutation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;

/// Normalized progress for one model key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressRecord {
    /// Phase label: "downloading" or "verifying".
    pub status: String,
    /// 0–100.
    pub percentage: u8,
    /// Bytes transferred so far.
    pub completed: u64,
    /// Total bytes, 0 when the server has not reported one.
    pub total: u64,
    /// The daemon's raw status line, or the failure text on errored pulls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressRecord {
    pub fn new(status: impl Into<String>, completed: u64, total: u64) -> Self {
        Self {
            status: status.into(),
            percentage: ProgressStore::percentage(completed, total),
            completed,
            total,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Immutable view of the whole store at one point in time.
pub type ProgressSnapshot = Arc<HashMap<String, ProgressRecord>>;

pub type SubscriberId = u64;

struct StoreInner {
    snapshot: ProgressSnapshot,
    subscribers: HashMap<SubscriberId, mpsc::UnboundedSender<ProgressSnapshot>>,
    next_subscriber: SubscriberId,
}

pub struct ProgressStore {
    inner: Mutex<StoreInner>,
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                snapshot: Arc::new(HashMap::new()),
                subscribers: HashMap::new(),
                next_subscriber: 0,
            }),
        }
    }

    /// Normalize raw byte counts into a percentage: 0 when `total` is 0,
    /// otherwise `round(completed / total * 100)` clamped to 0–100.
    pub fn percentage(completed: u64, total: u64) -> u8 {
        if total == 0 {
            return 0;
        }
        let pct = (completed as f64 / total as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }

    /// Write a record computed from raw byte counts.
    pub fn set(&self, key: &str, status: &str, completed: u64, total: u64) {
        self.set_record(key, ProgressRecord::new(status, completed, total));
    }

    /// Write a fully-formed record.
    pub fn set_record(&self, key: &str, record: ProgressRecord) {
        self.mutate(|map| {
            map.insert(key.to_string(), record);
            true
        });
    }

    /// Remove one key. No-op (and no notification) if the key is absent.
    pub fn clear(&self, key: &str) {
        self.mutate(|map| map.remove(key).is_some());
    }

    /// Remove everything. No-op if already empty.
    pub fn clear_all(&self) {
        self.mutate(|map| {
            let was_empty = map.is_empty();
            map.clear();
            !was_empty
        });
    }

    /// Current record for one key, if any.
    pub fn get(&self, key: &str) -> Option<ProgressRecord> {
        self.snapshot().get(key).cloned()
    }

    /// The current snapshot. Referentially stable between mutations.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).snapshot.clone()
    }

    /// Register a subscriber. Every mutation pushes the post-mutation
    /// snapshot to the returned receiver, in mutation order.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::UnboundedReceiver<ProgressSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.subscribers.remove(&id);
    }

    /// Apply a mutation under the lock. The closure returns whether anything
    /// changed; only a real change produces a new snapshot and notifies.
    fn mutate(&self, apply: impl FnOnce(&mut HashMap<String, ProgressRecord>) -> bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = (*inner.snapshot).clone();
        if !apply(&mut map) {
            return;
        }
        inner.snapshot = Arc::new(map);
        let snapshot = inner.snapshot.clone();
        // Dropped receivers are pruned here rather than on unsubscribe
        inner
            .subscribers
            .retain(|_, tx| tx.send(snapshot.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_normalization() {
        assert_eq!(ProgressStore::percentage(50, 200), 25);
        assert_eq!(ProgressStore::percentage(1, 3), 33);
        assert_eq!(ProgressStore::percentage(2, 3), 67);
        assert_eq!(ProgressStore::percentage(200, 200), 100);
        assert_eq!(ProgressStore::percentage(0, 200), 0);
    }

    #[test]
    fn test_percentage_zero_total() {
        assert_eq!(ProgressStore::percentage(0, 0), 0);
        assert_eq!(ProgressStore::percentage(123, 0), 0);
    }

    #[test]
    fn test_percentage_clamped() {
        assert_eq!(ProgressStore::percentage(300, 200), 100);
    }

    #[test]
    fn test_set_and_get() {
        let store = ProgressStore::new();
        store.set("llama3:8b", "downloading", 50, 200);
        let record = store.get("llama3:8b").unwrap();
        assert_eq!(record.status, "downloading");
        assert_eq!(record.percentage, 25);
        assert_eq!(record.completed, 50);
        assert_eq!(record.total, 200);
        assert_eq!(record.message, None);
    }

    #[test]
    fn test_keys_are_independent() {
        let store = ProgressStore::new();
        store.set("a", "downloading", 10, 100);
        store.set("b", "verifying", 100, 100);
        store.clear("a");
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b").unwrap().status, "verifying");
    }

    #[test]
    fn test_snapshot_stable_between_mutations() {
        let store = ProgressStore::new();
        store.set("m", "downloading", 1, 2);
        let first = store.snapshot();
        let second = store.snapshot();
        assert!(Arc::ptr_eq(&first, &second));

        store.set("m", "downloading", 2, 2);
        let third = store.snapshot();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_clear_absent_key_does_not_mutate() {
        let store = ProgressStore::new();
        store.set("m", "downloading", 1, 2);
        let before = store.snapshot();
        store.clear("missing");
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[tokio::test]
    async fn test_subscriber_sees_each_mutation() {
        let store = ProgressStore::new();
        let (id, mut rx) = store.subscribe();

        store.set("m", "downloading", 0, 100);
        store.set("m", "downloading", 50, 100);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.get("m").unwrap().percentage, 0);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.get("m").unwrap().percentage, 50);

        store.unsubscribe(id);
        store.set("m", "downloading", 100, 100);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_pruned() {
        let store = ProgressStore::new();
        let (_, rx) = store.subscribe();
        drop(rx);
        // Should not panic or grow the subscriber map
        store.set("m", "downloading", 1, 2);
        assert_eq!(store.inner.lock().unwrap().subscribers.len(), 0);
    }
}
