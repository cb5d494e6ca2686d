//! Checkpoint Store — `(app_token, table_id) → last_cursor` for the
//! compensation scan poller.

use std::path::Path;

use cw_domain::schema::Checkpoint;

use super::JsonStore;

pub struct CheckpointStore {
    inner: JsonStore<Checkpoint>,
}

fn key(app_token: &str, table_id: &str) -> String {
    format!("{app_token}/{table_id}")
}

impl CheckpointStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            inner: JsonStore::new(state_dir, "checkpoints.json"),
        }
    }

    pub async fn get(&self, app_token: &str, table_id: &str) -> Checkpoint {
        self.inner.get(&key(app_token, table_id)).await.unwrap_or_else(Checkpoint::zero)
    }

    pub async fn advance(&self, app_token: &str, table_id: &str, cursor: u64) {
        let mut cp = self.get(app_token, table_id).await;
        cp.advance(cursor);
        self.inner.set(key(app_token, table_id), cp).await;
    }
}
