//! In-process ledger, claim-check store and queue.
//!
//! Used by the gateway's `memory` backend and by tests. The ledger's
//! compare-and-create runs under a single mutex, which gives the same
//! mutual exclusion Firestore's `createDocument` gives across processes.
//! Expired ledger records are purged on every create and the queue keeps only
//! its most recent tasks, so a long-running `memory` gateway stays bounded.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use domain::{
    ClaimCheckKey, ClaimCheckStore, CreateOutcome, IdempotencyLedger, IdempotencyRecord, LedgerKey,
    QueuedTask, StoreError, TaskName, TaskQueue, Timestamp,
};

fn poisoned() -> StoreError {
    StoreError::unavailable("in-memory store lock poisoned")
}

/// [`IdempotencyLedger`] in memory. Expired records are purged on create.
#[derive(Default)]
pub struct InMemoryLedger {
    records: Mutex<HashMap<LedgerKey, IdempotencyRecord>>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Whether the ledger holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IdempotencyLedger for InMemoryLedger {
    async fn create(&self, record: &IdempotencyRecord) -> Result<CreateOutcome, StoreError> {
        let mut records = self.records.lock().map_err(|_| poisoned())?;
        let now = Timestamp::now();
        records.retain(|_, existing| !existing.is_expired(now));
        if records.contains_key(&record.key) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        records.insert(record.key.clone(), record.clone());
        Ok(CreateOutcome::Created)
    }
}

/// [`ClaimCheckStore`] in memory.
#[derive(Default)]
pub struct InMemoryClaimCheckStore {
    blobs: Mutex<HashMap<ClaimCheckKey, Vec<u8>>>,
}

impl InMemoryClaimCheckStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored.
    pub fn keys(&self) -> Vec<ClaimCheckKey> {
        self.blobs.lock().map(|b| b.keys().cloned().collect()).unwrap_or_default()
    }
}

#[async_trait]
impl ClaimCheckStore for InMemoryClaimCheckStore {
    async fn put(&self, key: &ClaimCheckKey, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.blobs.lock().map_err(|_| poisoned())?.insert(key.clone(), bytes);
        Ok(())
    }

    async fn get(&self, key: &ClaimCheckKey) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .lock()
            .map_err(|_| poisoned())?
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { key: key.to_string() })
    }
}

/// Tasks an [`InMemoryTaskQueue`] keeps by default.
pub const DEFAULT_RETAINED_TASKS: usize = 1024;

/// [`TaskQueue`] that records submitted tasks instead of delivering them.
///
/// Holds at most `capacity` tasks; the oldest is discarded when full.
pub struct InMemoryTaskQueue {
    tasks: Mutex<VecDeque<QueuedTask>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RETAINED_TASKS)
    }
}

impl InMemoryTaskQueue {
    /// Creates an empty queue retaining [`DEFAULT_RETAINED_TASKS`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty queue retaining at most `capacity` tasks (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self { tasks: Mutex::new(VecDeque::new()), capacity: capacity.max(1), next_id: AtomicU64::new(0) }
    }

    /// Snapshot of retained tasks in submission order.
    pub fn tasks(&self) -> Vec<QueuedTask> {
        self.tasks.lock().map(|t| t.iter().cloned().collect()).unwrap_or_default()
    }

    /// Removes and returns all retained tasks.
    pub fn drain(&self) -> Vec<QueuedTask> {
        self.tasks.lock().map(|mut t| t.drain(..).collect()).unwrap_or_default()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: QueuedTask) -> Result<TaskName, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut tasks = self.tasks.lock().map_err(|_| poisoned())?;
        if tasks.len() == self.capacity {
            tasks.pop_front();
        }
        tasks.push_back(task);
        drop(tasks);
        TaskName::new(format!("memory-task-{id}")).ok_or_else(|| StoreError::unavailable("empty task name"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{CorrelationId, DeliveryId, EventSource};
    use std::sync::Arc;

    fn long_ago() -> Timestamp {
        Timestamp::now().plus(chrono::Duration::hours(-48))
    }

    fn record(id: &str) -> IdempotencyRecord {
        IdempotencyRecord::admitted(EventSource::GitHub, &DeliveryId::new(id).unwrap(), Timestamp::now())
    }

    #[tokio::test]
    async fn second_create_is_a_duplicate() {
        let ledger = InMemoryLedger::new();
        assert_eq!(ledger.create(&record("a")).await.unwrap(), CreateOutcome::Created);
        assert_eq!(ledger.create(&record("a")).await.unwrap(), CreateOutcome::AlreadyExists);
        assert_eq!(ledger.create(&record("b")).await.unwrap(), CreateOutcome::Created);
    }

    #[tokio::test]
    async fn expired_record_can_be_recreated() {
        let ledger = InMemoryLedger::new();
        let stale = IdempotencyRecord::admitted(EventSource::GitHub, &DeliveryId::new("a").unwrap(), long_ago());
        assert_eq!(ledger.create(&stale).await.unwrap(), CreateOutcome::Created);
        assert_eq!(ledger.create(&record("a")).await.unwrap(), CreateOutcome::Created);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn expired_records_of_other_keys_are_purged() {
        let ledger = InMemoryLedger::new();
        for id in ["old-1", "old-2"] {
            let stale = IdempotencyRecord::admitted(EventSource::GitHub, &DeliveryId::new(id).unwrap(), long_ago());
            ledger.create(&stale).await.unwrap();
        }
        assert_eq!(ledger.len(), 2);

        assert_eq!(ledger.create(&record("fresh")).await.unwrap(), CreateOutcome::Created);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_admit_exactly_one() {
        let ledger = Arc::new(InMemoryLedger::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.create(&record("same")).await.unwrap() })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() == CreateOutcome::Created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn claim_check_round_trip() {
        let store = InMemoryClaimCheckStore::new();
        let key = ClaimCheckKey::for_correlation(&CorrelationId::from_existing("gh_x_1").unwrap());
        store.put(&key, b"payload".to_vec()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), b"payload".to_vec());

        let missing = ClaimCheckKey::for_correlation(&CorrelationId::from_existing("gh_y_1").unwrap());
        assert!(matches!(store.get(&missing).await, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn queue_records_tasks_in_order() {
        let queue = InMemoryTaskQueue::new();
        for id in ["a", "b"] {
            queue
                .enqueue(QueuedTask { correlation_id: CorrelationId::from_existing(id).unwrap(), body: vec![] })
                .await
                .unwrap();
        }
        let ids: Vec<_> = queue.drain().into_iter().map(|t| t.correlation_id.to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(queue.tasks().is_empty());
    }

    #[tokio::test]
    async fn full_queue_discards_the_oldest_task() {
        let queue = InMemoryTaskQueue::with_capacity(2);
        let mut names = Vec::new();
        for id in ["a", "b", "c"] {
            let name = queue
                .enqueue(QueuedTask { correlation_id: CorrelationId::from_existing(id).unwrap(), body: vec![] })
                .await
                .unwrap();
            names.push(name.to_string());
        }
        assert_eq!(names, vec!["memory-task-1", "memory-task-2", "memory-task-3"]);
        let ids: Vec<_> = queue.tasks().into_iter().map(|t| t.correlation_id.to_string()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
