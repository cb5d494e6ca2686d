//! Schema Cache & Runtime State — last-known field schema per table, and
//! the set of rule ids the Schema Watcher has runtime-disabled because
//! their trigger field disappeared.

use std::collections::HashSet;
use std::path::Path;

use cw_domain::schema::TableSchema;
use parking_lot::RwLock;

use super::JsonStore;

pub struct SchemaCacheStore {
    schemas: JsonStore<TableSchema>,
    /// Runtime-disabled rule ids. Held in memory only — never persisted
    /// back to the rules file, and reset whenever the file reloads.
    disabled_rules: RwLock<HashSet<String>>,
}

impl SchemaCacheStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            schemas: JsonStore::new(state_dir, "schema_cache.json"),
            disabled_rules: RwLock::new(HashSet::new()),
        }
    }

    pub async fn get(&self, table_id: &str) -> Option<TableSchema> {
        self.schemas.get(table_id).await
    }

    pub async fn set(&self, schema: TableSchema) {
        self.schemas.set(schema.table_id.clone(), schema).await;
    }

    pub fn disable_rule(&self, rule_id: &str) {
        self.disabled_rules.write().insert(rule_id.to_string());
    }

    pub fn is_disabled(&self, rule_id: &str) -> bool {
        self.disabled_rules.read().contains(rule_id)
    }

    pub fn clear_runtime_overrides(&self) {
        self.disabled_rules.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cw_domain::schema::{FieldKind, FieldSchema};

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SchemaCacheStore::new(dir.path());
        let schema = TableSchema {
            table_id: "tbl1".into(),
            fields: vec![FieldSchema { name: "a".into(), kind: FieldKind::Text }],
            refreshed_at: Utc::now(),
        };
        store.set(schema).await;
        assert!(store.get("tbl1").await.unwrap().has_field("a"));
    }

    #[test]
    fn disabling_a_rule_is_queryable_and_clearable() {
        let dir = tempfile::tempdir().unwrap();
        let store = SchemaCacheStore::new(dir.path());
        store.disable_rule("R001");
        assert!(store.is_disabled("R001"));
        store.clear_runtime_overrides();
        assert!(!store.is_disabled("R001"));
    }
}
