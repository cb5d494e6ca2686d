//! Table field-schema cache entries and checkpoint cursor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    SingleSelect,
    MultiSelect,
    Date,
    Person,
    Phone,
    Location,
    Link,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub kind: FieldKind,
}

/// Last-known field schema for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_id: String,
    pub fields: Vec<FieldSchema>,
    pub refreshed_at: DateTime<Utc>,
}

impl TableSchema {
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Field names present in `previous` but absent here.
    pub fn removed_fields<'a>(&self, previous: &'a TableSchema) -> Vec<&'a str> {
        previous
            .fields
            .iter()
            .filter(|f| !self.has_field(&f.name))
            .map(|f| f.name.as_str())
            .collect()
    }
}

/// `(app_token, table_id) → last_cursor`. All records with cursor ≤
/// `last_cursor` have been considered at least once by the scan poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_cursor: u64,
}

impl Checkpoint {
    pub fn zero() -> Self {
        Self { last_cursor: 0 }
    }

    pub fn advance(&mut self, cursor: u64) {
        if cursor > self.last_cursor {
            self.last_cursor = cursor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(fields: &[&str]) -> TableSchema {
        TableSchema {
            table_id: "tbl1".into(),
            fields: fields
                .iter()
                .map(|n| FieldSchema {
                    name: n.to_string(),
                    kind: FieldKind::Text,
                })
                .collect(),
            refreshed_at: Utc::now(),
        }
    }

    #[test]
    fn removed_fields_detects_dropped_field() {
        let previous = schema(&["案由", "案件分类"]);
        let current = schema(&["案由"]);
        assert_eq!(current.removed_fields(&previous), vec!["案件分类"]);
    }

    #[test]
    fn checkpoint_only_advances_forward() {
        let mut cp = Checkpoint::zero();
        cp.advance(5);
        cp.advance(3);
        assert_eq!(cp.last_cursor, 5);
        cp.advance(9);
        assert_eq!(cp.last_cursor, 9);
    }
}
