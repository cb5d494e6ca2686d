//! Idempotency Store — two keyspaces: event-level (deduplicated with a
//! TTL) and business-level (permanent once a rule has successfully
//! completed its pipeline for a given change-set).

use std::path::Path;

use chrono::{DateTime, Utc};

use super::JsonStore;

pub struct IdempotencyStore {
    events: JsonStore<DateTime<Utc>>,
    business: JsonStore<DateTime<Utc>>,
    event_ttl: chrono::Duration,
}

impl IdempotencyStore {
    pub fn new(state_dir: &Path, event_ttl_seconds: i64) -> Self {
        Self {
            events: JsonStore::new(state_dir, "idempotency_events.json"),
            business: JsonStore::new(state_dir, "idempotency_business.json"),
            event_ttl: chrono::Duration::seconds(event_ttl_seconds),
        }
    }

    /// Returns `true` and records the event id if it has not been seen
    /// within the TTL window; returns `false` if it is a duplicate.
    pub async fn claim_event(&self, event_id: &str) -> bool {
        let now = Utc::now();
        if let Some(seen_at) = self.events.get(event_id).await {
            if now - seen_at < self.event_ttl {
                return false;
            }
        }
        self.events.set(event_id.to_string(), now).await;
        true
    }

    /// Returns `true` if this business-level change has already
    /// completed successfully and the pipeline should be skipped.
    pub async fn has_succeeded(&self, key: &str) -> bool {
        self.business.contains(key).await
    }

    /// Records a business-level key as permanently successful. Callers
    /// must only call this once the rule's action pipeline has run to
    /// completion without error — recording it earlier would make a
    /// redelivered event that never actually succeeded look done.
    pub async fn record_success(&self, key: &str) {
        self.business.set(key.to_string(), Utc::now()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_claimed_once_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdempotencyStore::new(dir.path(), 3600);
        assert!(store.claim_event("evt1").await);
        assert!(!store.claim_event("evt1").await);
    }

    #[tokio::test]
    async fn event_reclaimable_after_ttl_elapses() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdempotencyStore::new(dir.path(), 0);
        assert!(store.claim_event("evt1").await);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(store.claim_event("evt1").await);
    }

    #[tokio::test]
    async fn business_key_recorded_once_permanently() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdempotencyStore::new(dir.path(), 3600);
        assert!(!store.has_succeeded("hash1").await);
        store.record_success("hash1").await;
        assert!(store.has_succeeded("hash1").await);
    }

    #[tokio::test]
    async fn unrecorded_key_is_not_considered_succeeded() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdempotencyStore::new(dir.path(), 3600);
        assert!(!store.has_succeeded("never-ran").await);
    }
}
