//! Conversion between the domain's tagged [`Value`] and the tabular
//! backend's flat JSON field representation.

use cw_domain::record::{Fields, Value};
use serde_json::Map;

/// Render a field map the way the backend expects it on the wire: plain
/// JSON values, not the internally tagged representation.
pub fn fields_to_wire(fields: &Fields) -> serde_json::Value {
    let mut map = Map::new();
    for (name, value) in fields {
        map.insert(name.clone(), value_to_wire(value));
    }
    serde_json::Value::Object(map)
}

fn value_to_wire(value: &Value) -> serde_json::Value {
    match value {
        Value::Text(s) | Value::SingleSelect(s) | Value::Phone(s) | Value::Location(s) => {
            serde_json::Value::String(s.clone())
        }
        Value::MultiSelect(items) => serde_json::json!(items),
        Value::Date(ms) => serde_json::json!(ms),
        Value::Person(ids) => serde_json::json!(ids.iter().map(|id| serde_json::json!({"id": id})).collect::<Vec<_>>()),
        Value::Link { table_id, record_ids } => {
            serde_json::json!({"table_id": table_id, "record_ids": record_ids})
        }
        Value::Unknown(v) => v.clone(),
    }
}

/// Parse a backend field-map JSON object into typed domain values. A
/// field schema would let this be exact; without one, values are
/// classified structurally and anything that doesn't fit a known shape
/// is kept as `Value::Unknown` rather than dropped.
pub fn wire_to_fields(raw: &serde_json::Value) -> Fields {
    let mut out = Fields::new();
    let Some(obj) = raw.as_object() else {
        return out;
    };
    for (name, v) in obj {
        out.insert(name.clone(), wire_to_value(v));
    }
    out
}

fn wire_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => {
            Value::Date(n.as_i64().unwrap_or_default())
        }
        serde_json::Value::Array(items) => {
            if items.iter().all(|i| i.is_string()) {
                Value::MultiSelect(items.iter().filter_map(|i| i.as_str().map(str::to_string)).collect())
            } else if items.iter().all(|i| i.get("id").is_some()) {
                Value::Person(
                    items
                        .iter()
                        .filter_map(|i| i.get("id").and_then(|id| id.as_str()).map(str::to_string))
                        .collect(),
                )
            } else {
                Value::Unknown(v.clone())
            }
        }
        serde_json::Value::Object(obj) if obj.contains_key("table_id") && obj.contains_key("record_ids") => {
            let table_id = obj.get("table_id").and_then(|t| t.as_str()).unwrap_or_default().to_string();
            let record_ids = obj
                .get("record_ids")
                .and_then(|r| r.as_array())
                .map(|a| a.iter().filter_map(|i| i.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            Value::Link { table_id, record_ids }
        }
        other => Value::Unknown(other.clone()),
    }
}
