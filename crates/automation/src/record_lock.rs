//! Per-record concurrency control.
//!
//! Ensures automation processing for a given `(app_token, table_id,
//! record_id)` is strictly serialized — two events for the same record
//! cannot run concurrently — while different records proceed in
//! parallel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct RecordLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for RecordLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordLockMap {
    pub fn new() -> Self {
        Self { locks: Mutex::new(HashMap::new()) }
    }

    /// Acquire the serialization lock for `record_key`, waiting if
    /// another event for the same record is currently processing.
    pub async fn acquire(&self, record_key: &str) -> OwnedSemaphorePermit {
        let sem = {
            let mut locks = self.locks.lock();
            locks.entry(record_key.to_owned()).or_insert_with(|| Arc::new(Semaphore::new(1))).clone()
        };
        sem.acquire_owned().await.expect("semaphore is never closed")
    }

    pub fn record_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop tracked locks that are not currently held (cleanup for
    /// long-running processes with a large, churning record set).
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}
