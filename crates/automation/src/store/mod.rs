//! Generic JSON-file-backed key/value store shared by the Snapshot,
//! Idempotency, Checkpoint, and Schema Cache stores.
//!
//! Each store owns one file under the engine's state directory and holds
//! its working set in a `RwLock<HashMap>`. Writes persist the whole map
//! via `spawn_blocking` so a slow disk never stalls the Tokio executor;
//! readers never block on a writer beyond the in-memory lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

pub mod checkpoint;
pub mod delay;
pub mod idempotency;
pub mod runlog;
pub mod schema_cache;
pub mod snapshot;

/// A single-writer-mutex, JSON-file-backed map. `K` must serialize as a
/// JSON object key, so callers key these stores by `String`.
pub struct JsonStore<V> {
    inner: RwLock<HashMap<String, V>>,
    path: PathBuf,
}

impl<V> JsonStore<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(state_dir: &Path, file_name: &str) -> Self {
        let path = state_dir.join(file_name);
        let map = std::fs::read_to_string(&path)
            .ok()
            .and_then(|data| serde_json::from_str::<HashMap<String, V>>(&data).ok())
            .unwrap_or_default();
        if !map.is_empty() {
            tracing::info!(count = map.len(), file = file_name, "loaded store from disk");
        }
        Self {
            inner: RwLock::new(map),
            path,
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn set(&self, key: String, value: V) {
        self.inner.write().await.insert(key, value);
        self.persist().await;
    }

    pub async fn remove(&self, key: &str) -> Option<V> {
        let removed = self.inner.write().await.remove(key);
        if removed.is_some() {
            self.persist().await;
        }
        removed
    }

    pub async fn snapshot(&self) -> HashMap<String, V> {
        self.inner.read().await.clone()
    }

    async fn persist(&self) {
        let map = self.inner.read().await.clone();
        let path = self.path.clone();
        let Ok(json) = serde_json::to_string_pretty(&map) else {
            return;
        };
        let _ = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Err(e) = std::fs::write(&path, json) {
                tracing::warn!(error = %e, path = %path.display(), "failed to persist store");
            }
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonStore<u32> = JsonStore::new(dir.path(), "x.json");
        store.set("a".into(), 1).await;
        assert_eq!(store.get("a").await, Some(1));
    }

    #[tokio::test]
    async fn reload_picks_up_persisted_contents() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store: JsonStore<u32> = JsonStore::new(dir.path(), "x.json");
            store.set("a".into(), 7).await;
        }
        let reloaded: JsonStore<u32> = JsonStore::new(dir.path(), "x.json");
        assert_eq!(reloaded.get("a").await, Some(7));
    }

    #[tokio::test]
    async fn remove_drops_key() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonStore<u32> = JsonStore::new(dir.path(), "x.json");
        store.set("a".into(), 1).await;
        assert_eq!(store.remove("a").await, Some(1));
        assert_eq!(store.get("a").await, None);
    }
}
