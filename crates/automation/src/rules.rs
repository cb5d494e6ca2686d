//! Rule Registry — loads the declarative rules file and indexes rules by
//! table. Hot-reloadable: a config-file change swaps the whole registry
//! under a read-write lock; in-flight processing keeps the snapshot it
//! started with.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cw_domain::error::{Error, Result};
use cw_domain::rule::{Rule, RuleFile};
use parking_lot::RwLock;

pub struct RuleRegistry {
    path: PathBuf,
    by_table: RwLock<Arc<HashMap<String, Vec<Rule>>>>,
}

impl RuleRegistry {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let by_table = Self::read_and_index(&path)?;
        Ok(Self {
            path,
            by_table: RwLock::new(Arc::new(by_table)),
        })
    }

    fn read_and_index(path: &Path) -> Result<HashMap<String, Vec<Rule>>> {
        let raw = std::fs::read_to_string(path)?;
        let parsed: RuleFile = serde_yaml::from_str(&raw)?;
        let mut by_table: HashMap<String, Vec<Rule>> = HashMap::new();
        for rule in parsed.rules {
            by_table.entry(rule.table.table_id.clone()).or_default().push(rule);
        }
        Ok(by_table)
    }

    /// Re-read the rules file from disk and atomically swap the index.
    /// Rules currently mid-evaluation keep the `Arc` they already hold.
    pub fn reload(&self) -> Result<()> {
        let fresh = Self::read_and_index(&self.path)?;
        *self.by_table.write() = Arc::new(fresh);
        Ok(())
    }

    /// Rules registered for `table_id`, including disabled ones — callers
    /// filter with [`Rule::is_active`] plus schema-cache runtime overrides.
    pub fn for_table(&self, table_id: &str) -> Vec<Rule> {
        self.by_table.read().get(table_id).cloned().unwrap_or_default()
    }

    pub fn get(&self, rule_id: &str) -> Option<Rule> {
        self.by_table
            .read()
            .values()
            .flatten()
            .find(|r| r.id == rule_id)
            .cloned()
    }

    pub fn all(&self) -> Vec<Rule> {
        self.by_table.read().values().flatten().cloned().collect()
    }
}

/// Validates a parsed rule file, returning an error for the first rule
/// whose trigger has no matchable predicate.
pub fn validate_rule_file(file: &RuleFile) -> Result<()> {
    for rule in &file.rules {
        if !rule.trigger.has_matchable_predicate() {
            return Err(Error::Config(format!(
                "rule `{}` has a trigger with no matchable predicate",
                rule.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
rules:
  - id: R001
    enabled: true
    table: { table_id: tbl_cases }
    trigger: { on: [updated], field: status }
    pipeline: [{ type: log.write, template: "x" }]
  - id: R002
    enabled: true
    table: { table_id: tbl_cases }
    trigger: { on: [created] }
    pipeline: []
"#;

    fn write_temp(contents: &str) -> tempfile::TempPath {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.into_temp_path()
    }

    #[test]
    fn indexes_rules_by_table() {
        let path = write_temp(YAML);
        let registry = RuleRegistry::load(&path).unwrap();
        assert_eq!(registry.for_table("tbl_cases").len(), 2);
        assert!(registry.for_table("tbl_other").is_empty());
    }

    #[test]
    fn reload_picks_up_file_changes() {
        let path = write_temp(YAML);
        let registry = RuleRegistry::load(&path).unwrap();
        std::fs::write(&path, "rules: []").unwrap();
        registry.reload().unwrap();
        assert!(registry.for_table("tbl_cases").is_empty());
    }

    #[test]
    fn get_finds_rule_by_id_across_tables() {
        let path = write_temp(YAML);
        let registry = RuleRegistry::load(&path).unwrap();
        assert!(registry.get("R002").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn validate_rejects_unmatchable_trigger() {
        let file: RuleFile = serde_yaml::from_str(
            r#"rules:
  - id: R003
    enabled: true
    table: { table_id: t }
    trigger: { on: [updated] }
    pipeline: []"#,
        )
        .unwrap();
        assert!(validate_rule_file(&file).is_err());
    }
}
