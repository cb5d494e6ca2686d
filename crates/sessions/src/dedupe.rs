//! In-memory TTL dedupe store for the conversation channel callback:
//! `message_id` is checked first (primary key), falling back to
//! `event_id` when a channel retransmit omits it.
//!
//! Grounded on the teacher's `api::inbound::DedupeStore` — a
//! `Mutex<HashMap<String, Instant>>` with lazy eviction once the map
//! grows large, rather than a background sweep task.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const LAZY_CLEANUP_THRESHOLD: usize = 10_000;

pub struct DedupeStore {
    seen: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl DedupeStore {
    pub fn new(ttl: Duration) -> Self {
        Self { seen: Mutex::new(HashMap::new()), ttl }
    }

    /// Returns `true` if this key was already seen within the TTL window.
    fn check_and_insert(&self, key: &str) -> bool {
        let mut map = self.seen.lock();
        let now = Instant::now();
        if map.len() > LAZY_CLEANUP_THRESHOLD {
            map.retain(|_, ts| now.duration_since(*ts) < self.ttl);
        }
        if let Some(ts) = map.get(key) {
            if now.duration_since(*ts) < self.ttl {
                return true;
            }
        }
        map.insert(key.to_string(), now);
        false
    }

    /// Checks `message_id` first, falling back to `event_id` when absent.
    /// Returns `true` if the envelope is a duplicate.
    pub fn check_envelope(&self, message_id: Option<&str>, event_id: Option<&str>) -> bool {
        match message_id.or(event_id) {
            Some(key) => self.check_and_insert(key),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_message_id_is_detected() {
        let store = DedupeStore::new(Duration::from_secs(60));
        assert!(!store.check_envelope(Some("m1"), None));
        assert!(store.check_envelope(Some("m1"), None));
    }

    #[test]
    fn falls_back_to_event_id_when_message_id_absent() {
        let store = DedupeStore::new(Duration::from_secs(60));
        assert!(!store.check_envelope(None, Some("e1")));
        assert!(store.check_envelope(None, Some("e1")));
    }

    #[test]
    fn envelope_with_neither_id_is_never_a_duplicate() {
        let store = DedupeStore::new(Duration::from_secs(60));
        assert!(!store.check_envelope(None, None));
        assert!(!store.check_envelope(None, None));
    }
}
