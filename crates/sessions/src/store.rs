//! Orchestrator-owned conversation state store.
//!
//! Persists `conversations.json` under the configured state path. Each
//! `open_id` maps to a [`ConversationState`] tracking active table/record
//! context, last query results, the pending-action slot, message history,
//! and slot memory. Writes flush the whole map synchronously, matching the
//! teacher's `SessionStore::flush` idiom rather than batching.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use cw_domain::conversation::{ConversationState, PendingAction};
use cw_domain::error::{Error, Result};
use parking_lot::RwLock;

pub struct ConversationStore {
    path: PathBuf,
    conversations: RwLock<HashMap<String, ConversationState>>,
}

impl ConversationStore {
    /// Load or create the conversation store at `state_dir/conversations.json`.
    pub fn new(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir).map_err(Error::Io)?;
        let path = state_dir.join("conversations.json");
        let conversations = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        tracing::info!(conversations = conversations.len(), path = %path.display(), "conversation store loaded");
        Ok(Self { path, conversations: RwLock::new(conversations) })
    }

    /// Resolve or create the conversation for `open_id`. Returns `(state, is_new)`.
    pub fn resolve_or_create(&self, open_id: &str) -> (ConversationState, bool) {
        {
            let conversations = self.conversations.read();
            if let Some(state) = conversations.get(open_id) {
                return (state.clone(), false);
            }
        }
        let state = ConversationState::new(open_id, Utc::now());
        self.conversations.write().insert(open_id.to_string(), state.clone());
        self.flush();
        (state, true)
    }

    pub fn get(&self, open_id: &str) -> Option<ConversationState> {
        self.conversations.read().get(open_id).cloned()
    }

    /// Apply `mutate` to the conversation and persist. Creates the
    /// conversation first if it doesn't exist. Does not touch
    /// `last_active_at` itself — callers that represent real user
    /// activity should call [`Self::touch`] explicitly.
    pub fn update(&self, open_id: &str, mutate: impl FnOnce(&mut ConversationState)) -> ConversationState {
        self.resolve_or_create(open_id);
        let updated = {
            let mut conversations = self.conversations.write();
            let state = conversations.get_mut(open_id).expect("just resolved or created");
            mutate(state);
            state.clone()
        };
        self.flush();
        updated
    }

    /// Mark the conversation as active right now.
    pub fn touch(&self, open_id: &str) -> ConversationState {
        let now = Utc::now();
        self.update(open_id, |state| state.touch(now))
    }

    /// Install a pending action, returning any superseded one.
    pub fn set_pending_action(&self, open_id: &str, action: PendingAction) -> Option<PendingAction> {
        let mut superseded = None;
        self.update(open_id, |state| {
            superseded = state.set_pending_action(action);
        });
        superseded
    }

    pub fn clear_pending_action(&self, open_id: &str) {
        self.update(open_id, |state| {
            state.pending_action = None;
        });
    }

    /// Evict every conversation idle for at least `ttl`. Returns the
    /// number evicted.
    pub fn prune_idle(&self, ttl: chrono::Duration) -> usize {
        let now = Utc::now();
        let mut conversations = self.conversations.write();
        let before = conversations.len();
        conversations.retain(|_, state| !state.is_idle(now, ttl));
        let evicted = before - conversations.len();
        drop(conversations);
        if evicted > 0 {
            self.flush();
            tracing::info!(evicted, "pruned idle conversations");
        }
        evicted
    }

    pub fn list(&self) -> Vec<ConversationState> {
        self.conversations.read().values().cloned().collect()
    }

    fn flush(&self) {
        let conversations = self.conversations.read();
        let Ok(json) = serde_json::to_string_pretty(&*conversations) else { return };
        drop(conversations);
        if let Err(e) = std::fs::write(&self.path, json) {
            tracing::warn!(error = %e, path = %self.path.display(), "failed to persist conversation store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_domain::conversation::{PendingActionKind};

    #[test]
    fn resolve_or_create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();
        let (first, is_new) = store.resolve_or_create("ou_A");
        assert!(is_new);
        let (second, is_new) = store.resolve_or_create("ou_A");
        assert!(!is_new);
        assert_eq!(first.open_id, second.open_id);
    }

    #[test]
    fn update_mutates_without_touching() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();
        let before = store.resolve_or_create("ou_A").0.last_active_at;
        let updated = store.update("ou_A", |s| s.active_table = Some("tbl1".into()));
        assert_eq!(updated.active_table, Some("tbl1".to_string()));
        assert_eq!(updated.last_active_at, before);
    }

    #[test]
    fn touch_advances_last_active_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();
        let before = store.resolve_or_create("ou_A").0.last_active_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        let touched = store.touch("ou_A");
        assert!(touched.last_active_at > before);
    }

    #[test]
    fn reload_reads_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ConversationStore::new(dir.path()).unwrap();
            store.update("ou_A", |s| s.active_table = Some("tbl1".into()));
        }
        let reloaded = ConversationStore::new(dir.path()).unwrap();
        assert_eq!(reloaded.get("ou_A").unwrap().active_table, Some("tbl1".to_string()));
    }

    #[test]
    fn new_pending_action_supersedes_old_via_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();
        let now = Utc::now();
        let first = PendingAction {
            kind: PendingActionKind::CompleteFields,
            target_ref: None,
            payload: serde_json::json!({}),
            expires_at: now + chrono::Duration::minutes(5),
        };
        assert!(store.set_pending_action("ou_A", first).is_none());
        let second = PendingAction {
            kind: PendingActionKind::ConfirmDelete,
            target_ref: None,
            payload: serde_json::json!({}),
            expires_at: now + chrono::Duration::minutes(5),
        };
        let superseded = store.set_pending_action("ou_A", second);
        assert!(matches!(superseded.unwrap().kind, PendingActionKind::CompleteFields));
    }

    #[test]
    fn prune_idle_evicts_stale_conversations() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();
        store.update("ou_A", |s| s.active_table = Some("tbl1".into()));
        store.update("ou_A", |s| s.last_active_at = Utc::now() - chrono::Duration::minutes(31));
        assert_eq!(store.prune_idle(chrono::Duration::minutes(30)), 1);
        assert!(store.get("ou_A").is_none());
    }
}
