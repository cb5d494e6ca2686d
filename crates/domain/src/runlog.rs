//! Run-log row and dead-letter entry shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::Change;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunResult {
    Success,
    Partial,
    Failed,
    NoMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDetail {
    #[serde(rename = "type")]
    pub action_type: String,
    pub retry_count: u32,
    pub duration_ms: u64,
}

/// One fixed-shape row per rule evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogRow {
    pub timestamp: DateTime<Utc>,
    pub event_id: String,
    pub rule_id: String,
    pub app_token: String,
    pub table_id: String,
    pub record_id: String,
    pub rules_evaluated: Vec<String>,
    pub rules_matched: Vec<String>,
    #[serde(default)]
    pub trigger_field: Option<String>,
    #[serde(default)]
    pub changed: Option<Change>,
    pub actions_executed: Vec<String>,
    pub actions_detail: Vec<ActionDetail>,
    /// Rendered text from any `log.write` actions in this run, in
    /// execution order.
    #[serde(default)]
    pub log_messages: Vec<String>,
    pub result: RunResult,
    #[serde(default)]
    pub error: Option<String>,
    pub retry_count: u32,
    pub sent_to_dead_letter: bool,
    pub duration_ms: u64,
}

/// A permanently-failed action, kept for manual reprocessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: uuid::Uuid,
    pub rule_id: String,
    pub table_id: String,
    pub record_id: String,
    pub action_type: String,
    pub final_error: String,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}
