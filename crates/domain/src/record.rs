//! Record, field-value, and snapshot types shared by the automation engine
//! and the bitable client.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Locator triplet required for any mutating record call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub app_token: String,
    pub table_id: String,
    pub record_id: String,
}

impl Locator {
    pub fn new(
        app_token: impl Into<String>,
        table_id: impl Into<String>,
        record_id: impl Into<String>,
    ) -> Self {
        Self {
            app_token: app_token.into(),
            table_id: table_id.into(),
            record_id: record_id.into(),
        }
    }

    /// Composite serialization-key string used by per-record locks and
    /// idempotency hashing: `app_token/table_id/record_id`.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.app_token, self.table_id, self.record_id)
    }
}

/// A typed field value. Unknown/duck-typed payloads are preserved verbatim
/// as raw JSON rather than dropped, so the match engine can still treat
/// them as "changed" when bytes differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Value {
    Text(String),
    SingleSelect(String),
    MultiSelect(Vec<String>),
    /// Epoch-ms UTC.
    Date(i64),
    /// List of opaque chat-platform user ids.
    Person(Vec<String>),
    Phone(String),
    Location(String),
    /// Link to a record in another table.
    Link { table_id: String, record_ids: Vec<String> },
    /// Anything the schema doesn't model explicitly; preserved raw.
    Unknown(serde_json::Value),
}

impl Value {
    /// Best-effort plain-text rendering, used by template placeholder
    /// substitution (`{field}`) in action pipelines.
    pub fn render(&self) -> String {
        match self {
            Value::Text(s) | Value::SingleSelect(s) | Value::Phone(s) | Value::Location(s) => {
                s.clone()
            }
            Value::MultiSelect(items) => items.join(", "),
            Value::Date(ms) => DateTime::<Utc>::from_timestamp_millis(*ms)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default(),
            Value::Person(ids) => ids.join(", "),
            Value::Link { record_ids, .. } => record_ids.join(", "),
            Value::Unknown(v) => v.to_string(),
        }
    }
}

/// A field-name → value mapping for one record.
pub type Fields = BTreeMap<String, Value>;

/// A fetched, in-memory view of one record's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub locator: Locator,
    pub fields: Fields,
}

/// Per-record memoized "last successfully processed" state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub fields: Fields,
    pub updated_at: DateTime<Utc>,
}

/// One observed difference between a snapshot and freshly fetched fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub field_name: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// Diff `current` against `previous`, producing the set of changed fields.
///
/// A field present in one side and absent in the other counts as changed.
/// Fields identical in both are omitted.
pub fn diff_fields(previous: Option<&Fields>, current: &Fields) -> Vec<Change> {
    let mut changes = Vec::new();
    let empty = Fields::new();
    let previous = previous.unwrap_or(&empty);

    for (name, new_value) in current {
        match previous.get(name) {
            Some(old_value) if old_value == new_value => {}
            Some(old_value) => changes.push(Change {
                field_name: name.clone(),
                old: Some(old_value.clone()),
                new: Some(new_value.clone()),
            }),
            None => changes.push(Change {
                field_name: name.clone(),
                old: None,
                new: Some(new_value.clone()),
            }),
        }
    }

    for (name, old_value) in previous {
        if !current.contains_key(name) {
            changes.push(Change {
                field_name: name.clone(),
                old: Some(old_value.clone()),
                new: None,
            });
        }
    }

    changes
}
