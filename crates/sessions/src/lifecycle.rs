//! Idle-TTL eviction loop for conversation state.
//!
//! Conversation state has no daily-reset concept — only the idle timeout
//! named in the data model (≥ 30 min). This is a periodic sweep rather
//! than per-message reset logic, since a stale conversation simply drops
//! out of the store; the next inbound message for that `open_id` starts a
//! fresh one via `ConversationStore::resolve_or_create`.

use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::store::ConversationStore;

pub struct LifecycleManager {
    idle_ttl: Duration,
}

impl LifecycleManager {
    pub fn new(idle_ttl_minutes: i64) -> Self {
        Self { idle_ttl: Duration::minutes(idle_ttl_minutes.max(1)) }
    }

    pub fn sweep_once(&self, store: &ConversationStore) -> usize {
        store.prune_idle(self.idle_ttl)
    }

    /// Runs [`Self::sweep_once`] on a fixed interval until cancelled.
    /// Intended to be spawned as a background task.
    pub async fn run_forever(&self, store: &ConversationStore, interval: StdDuration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.sweep_once(store);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn sweep_evicts_past_the_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();
        store.update("ou_A", |s| s.active_table = Some("tbl1".into()));
        store.update("ou_A", |s| s.last_active_at = Utc::now() - chrono::Duration::minutes(31));

        let manager = LifecycleManager::new(30);
        assert_eq!(manager.sweep_once(&store), 1);
        assert!(store.get("ou_A").is_none());
    }

    #[test]
    fn sweep_keeps_active_conversations() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();
        store.resolve_or_create("ou_A");

        let manager = LifecycleManager::new(30);
        assert_eq!(manager.sweep_once(&store), 0);
        assert!(store.get("ou_A").is_some());
    }
}
