//! Change-event envelope and idempotency-key computation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Updated,
    FieldChanged,
    SchemaChanged,
}

impl EventType {
    pub fn matches_trigger_on(self, on: crate::rule::TriggerOn) -> bool {
        use crate::rule::TriggerOn;
        matches!(
            (self, on),
            (EventType::Created, TriggerOn::Created) | (EventType::Updated, TriggerOn::Updated)
        )
    }
}

/// Normalized change-event, the unit the Dispatcher hands to the
/// Processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub event_type: EventType,
    pub table_id: String,
    pub record_id: String,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

/// Stable hash of `(rule_id, table_id, record_id, sorted-change-set)`,
/// used as the business-level idempotency key.
pub fn business_idempotency_key(
    rule_id: &str,
    table_id: &str,
    record_id: &str,
    changed_fields: &[&str],
) -> String {
    let mut sorted: Vec<&str> = changed_fields.to_vec();
    sorted.sort_unstable();
    let mut hasher = Sha256::new();
    hasher.update(rule_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(table_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(record_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(sorted.join(",").as_bytes());
    hex::encode(hasher.finalize())
}
