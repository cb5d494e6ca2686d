//! Snapshot Store — per-record memoized "last successfully processed"
//! field state, keyed by `app_token/table_id/record_id`.

use std::path::Path;

use cw_domain::record::{diff_fields, Change, Fields, Locator, SnapshotEntry};

use super::JsonStore;

pub struct SnapshotStore {
    inner: JsonStore<SnapshotEntry>,
}

impl SnapshotStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            inner: JsonStore::new(state_dir, "snapshots.json"),
        }
    }

    pub async fn load(&self, locator: &Locator) -> Option<SnapshotEntry> {
        self.inner.get(&locator.key()).await
    }

    pub async fn save(&self, locator: &Locator, fields: Fields) {
        let entry = SnapshotEntry {
            fields,
            updated_at: chrono::Utc::now(),
        };
        self.inner.set(locator.key(), entry).await;
    }

    pub async fn remove(&self, locator: &Locator) {
        self.inner.remove(&locator.key()).await;
    }

    /// Record ids this store still holds a snapshot for under
    /// `app_token/table_id` — the candidate set a sync sweep checks
    /// against the backend's current record list to find deletions.
    pub async fn keys_for_table(&self, app_token: &str, table_id: &str) -> Vec<String> {
        let prefix = format!("{app_token}/{table_id}/");
        self.inner
            .snapshot()
            .await
            .into_keys()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// Diff `current` against the stored snapshot for `locator`, if any.
    pub async fn diff(&self, locator: &Locator, current: &Fields) -> Vec<Change> {
        let previous = self.load(locator).await;
        diff_fields(previous.as_ref().map(|e| &e.fields), current)
    }
}
