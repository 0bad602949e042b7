//! Durable FIFO of pending remote mutations

mod table;

use std::sync::Arc;

use crate::config::DEFAULT_MAX_ATTEMPTS;
use crate::db::{LocalStore, StoreTx};
use crate::error::Result;
use crate::models::{Collection, NewQueueItem, QueueCounts, QueueItem, QueueStatus};

/// Sync queue backed by the `sync_queue` collection of a [`LocalStore`].
///
/// Items are appended `PENDING` and processed oldest first. A failed item goes
/// back to `PENDING` until it has used `max_attempts` attempts, after which it
/// is parked `FAILED` until an operator retries it.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    store: Arc<LocalStore>,
    max_attempts: u32,
}

impl SyncQueue {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self::with_max_attempts(store, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(store: Arc<LocalStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn write<T>(&self, f: impl FnOnce(&mut StoreTx<'_>) -> Result<T>) -> Result<T> {
        self.store.transaction(&[Collection::SyncQueue], f)
    }

    /// Append an item; returns its queue id
    pub fn enqueue(&self, item: &NewQueueItem) -> Result<i64> {
        self.write(|tx| tx.enqueue(item))
    }

    /// All `PENDING` items, oldest first
    pub fn dequeue_ready(&self) -> Result<Vec<QueueItem>> {
        self.list(Some(QueueStatus::Pending))
    }

    /// Claim an item for processing; false if it was no longer pending
    pub fn mark_in_flight(&self, id: i64) -> Result<bool> {
        self.write(|tx| tx.claim_queue_item(id))
    }

    /// Put a claimed item back in line untouched
    pub fn release(&self, id: i64) -> Result<bool> {
        self.write(|tx| tx.release_queue_item(id))
    }

    /// The remote accepted the mutation; the item is removed
    pub fn mark_succeeded(&self, id: i64) -> Result<bool> {
        self.write(|tx| tx.remove_queue_item(id))
    }

    /// Record a failed attempt and return the item's new state
    pub fn mark_failed(&self, id: i64, error: &str) -> Result<QueueItem> {
        let item = self.write(|tx| tx.record_queue_failure(id, error, self.max_attempts))?;

        if item.status == QueueStatus::Failed {
            tracing::error!(
                "Queue item #{id} ({} {}) parked after {} attempts: {error}",
                item.operation,
                item.entity_type,
                item.attempts
            );
        } else {
            tracing::warn!(
                "Queue item #{id} failed (attempt {}/{}): {error}",
                item.attempts,
                self.max_attempts
            );
        }
        Ok(item)
    }

    pub fn get(&self, id: i64) -> Result<Option<QueueItem>> {
        self.store.read(|tx| tx.queue_item(id))
    }

    pub fn list(&self, status: Option<QueueStatus>) -> Result<Vec<QueueItem>> {
        self.store.read(|tx| tx.queue_items(status))
    }

    pub fn counts(&self) -> Result<QueueCounts> {
        self.store.read(|tx| tx.queue_counts())
    }

    /// Give parked items (all, or one by id) a fresh retry budget
    pub fn retry_failed(&self, id: Option<i64>) -> Result<usize> {
        let revived = self.write(|tx| tx.revive_failed(id))?;
        if revived > 0 {
            tracing::info!("Requeued {revived} failed item(s)");
        }
        Ok(revived)
    }

    /// Requeue items a previous process left `IN_FLIGHT`
    pub fn recover_in_flight(&self) -> Result<usize> {
        let recovered = self.write(|tx| tx.reset_in_flight())?;
        if recovered > 0 {
            tracing::warn!("Recovered {recovered} interrupted queue item(s)");
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Operation, RecordId};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn queue(max_attempts: u32) -> SyncQueue {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        SyncQueue::with_max_attempts(store, max_attempts)
    }

    fn item(id: &str, operation: Operation) -> NewQueueItem {
        NewQueueItem {
            entity_type: Collection::Contacts,
            operation,
            entity_id: RecordId::permanent(id),
            payload: json!({ "id": id }),
        }
    }

    #[test]
    fn enqueue_starts_pending() {
        let queue = queue(5);
        let id = queue.enqueue(&item("1", Operation::Create)).unwrap();

        let stored = queue.get(id).unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Pending);
        assert_eq!(stored.attempts, 0);
        assert_eq!(stored.last_error, None);
        assert_eq!(stored.payload, json!({ "id": "1" }));
    }

    #[test]
    fn dequeue_ready_is_fifo() {
        let queue = queue(5);
        let ids: Vec<i64> = ["a", "b", "c"]
            .into_iter()
            .map(|id| queue.enqueue(&item(id, Operation::Update)).unwrap())
            .collect();

        let ready: Vec<i64> = queue.dequeue_ready().unwrap().iter().map(|i| i.id).collect();
        assert_eq!(ready, ids);
    }

    #[test]
    fn in_flight_items_are_not_ready() {
        let queue = queue(5);
        let id = queue.enqueue(&item("1", Operation::Delete)).unwrap();

        assert!(queue.mark_in_flight(id).unwrap());
        assert!(!queue.mark_in_flight(id).unwrap());
        assert!(queue.dequeue_ready().unwrap().is_empty());
    }

    #[test]
    fn succeeded_items_are_removed() {
        let queue = queue(5);
        let id = queue.enqueue(&item("1", Operation::Create)).unwrap();
        queue.mark_in_flight(id).unwrap();

        assert!(queue.mark_succeeded(id).unwrap());
        assert!(queue.get(id).unwrap().is_none());
    }

    #[test]
    fn failures_park_item_at_max_attempts() {
        let queue = queue(3);
        let id = queue.enqueue(&item("1", Operation::Update)).unwrap();

        for attempt in 1..=3 {
            queue.mark_in_flight(id).unwrap();
            let failed = queue.mark_failed(id, "boom").unwrap();
            assert_eq!(failed.attempts, attempt);
        }

        let parked = queue.get(id).unwrap().unwrap();
        assert_eq!(parked.status, QueueStatus::Failed);
        assert_eq!(parked.attempts, 3);
        assert_eq!(parked.last_error.as_deref(), Some("boom"));
        assert!(queue.dequeue_ready().unwrap().is_empty());

        // Parked items are not counted again.
        assert_eq!(queue.mark_failed(id, "again").unwrap().attempts, 3);
    }

    #[test]
    fn retry_failed_resets_attempts() {
        let queue = queue(1);
        let id = queue.enqueue(&item("1", Operation::Update)).unwrap();
        queue.mark_failed(id, "boom").unwrap();

        assert_eq!(queue.retry_failed(None).unwrap(), 1);

        let revived = queue.get(id).unwrap().unwrap();
        assert_eq!(revived.status, QueueStatus::Pending);
        assert_eq!(revived.attempts, 0);
    }

    #[test]
    fn retry_failed_by_id_leaves_others_parked() {
        let queue = queue(1);
        let first = queue.enqueue(&item("1", Operation::Update)).unwrap();
        let second = queue.enqueue(&item("2", Operation::Update)).unwrap();
        queue.mark_failed(first, "boom").unwrap();
        queue.mark_failed(second, "boom").unwrap();

        assert_eq!(queue.retry_failed(Some(second)).unwrap(), 1);

        let counts = queue.counts().unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.failed, 1);
    }

    #[test]
    fn recover_in_flight_requeues() {
        let queue = queue(5);
        let id = queue.enqueue(&item("1", Operation::Create)).unwrap();
        queue.mark_in_flight(id).unwrap();
        assert_eq!(queue.counts().unwrap().in_flight, 1);

        assert_eq!(queue.recover_in_flight().unwrap(), 1);
        assert_eq!(queue.dequeue_ready().unwrap().len(), 1);
    }

    #[test]
    fn queue_rejects_non_entity_collections() {
        let queue = queue(5);
        let mut bad = item("1", Operation::Create);
        bad.entity_type = Collection::SyncQueue;

        assert!(queue.enqueue(&bad).is_err());
    }
}
