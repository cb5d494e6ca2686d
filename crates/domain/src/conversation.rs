//! Conversational state shapes shared between the orchestrator and the
//! session store. Storage and TTL eviction live in `cw-sessions`; these
//! are the plain value types that flow through skills.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingActionKind {
    ConfirmDelete,
    ConfirmUpdate,
    CompleteFields,
}

/// A one-slot conversational continuation. At most one per conversation;
/// a new pending action supersedes the old one with a user-visible notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    pub kind: PendingActionKind,
    pub target_ref: Option<crate::record::Locator>,
    pub payload: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Slot memory captured mid-dialogue (e.g. partially filled create-record
/// fields awaiting a `complete_fields` resolution).
pub type SlotMemory = std::collections::BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Per-`open_id` conversational state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub open_id: String,
    pub active_table: Option<String>,
    pub active_record: Option<crate::record::Locator>,
    pub last_result_ids: Vec<String>,
    pub pending_action: Option<PendingAction>,
    pub message_history: Vec<HistoryTurn>,
    pub slot_memory: SlotMemory,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(open_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            open_id: open_id.into(),
            active_table: None,
            active_record: None,
            last_result_ids: Vec::new(),
            pending_action: None,
            message_history: Vec::new(),
            slot_memory: SlotMemory::new(),
            created_at: now,
            last_active_at: now,
        }
    }

    pub fn is_idle(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.last_active_at >= ttl
    }

    /// Install a new pending action, returning the superseded one (if
    /// any) so the caller can render a "previous action cancelled" notice.
    pub fn set_pending_action(&mut self, action: PendingAction) -> Option<PendingAction> {
        self.pending_action.replace(action)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_active_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_pending_action_supersedes_old_one() {
        let now = Utc::now();
        let mut state = ConversationState::new("ou_A", now);
        let first = PendingAction {
            kind: PendingActionKind::CompleteFields,
            target_ref: None,
            payload: serde_json::json!({}),
            expires_at: now + Duration::minutes(5),
        };
        let second = PendingAction {
            kind: PendingActionKind::ConfirmDelete,
            target_ref: None,
            payload: serde_json::json!({}),
            expires_at: now + Duration::minutes(5),
        };
        assert!(state.set_pending_action(first).is_none());
        let superseded = state.set_pending_action(second);
        assert!(matches!(superseded.unwrap().kind, PendingActionKind::CompleteFields));
    }

    #[test]
    fn idle_detection_uses_last_active_at() {
        let now = Utc::now();
        let mut state = ConversationState::new("ou_A", now);
        assert!(!state.is_idle(now, Duration::minutes(30)));
        state.last_active_at = now - Duration::minutes(31);
        assert!(state.is_idle(now, Duration::minutes(30)));
    }

    #[test]
    fn pending_action_expiry() {
        let now = Utc::now();
        let action = PendingAction {
            kind: PendingActionKind::ConfirmDelete,
            target_ref: None,
            payload: serde_json::json!({}),
            expires_at: now - Duration::seconds(1),
        };
        assert!(action.is_expired(now));
    }
}
