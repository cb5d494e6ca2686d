//! Schema Watcher — maintains the per-table field schema cache,
//! refreshed on `field_changed` events or by a periodic poller, and
//! applies runtime policy when a trigger field disappears.

use cw_domain::schema::TableSchema;

use crate::rules::RuleRegistry;
use crate::store::schema_cache::SchemaCacheStore;

pub struct SchemaWatcherConfig {
    pub risk_webhook_url: Option<String>,
    pub risk_webhook_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No prior cache existed for this table.
    Bootstrap,
    /// Diff against the prior cache was empty.
    Noop,
    /// Fields were added, removed, or retyped; `removed_fields` names any
    /// that disappeared (which may have runtime-disabled rules).
    Changed { removed_fields: Vec<String>, disabled_rules: Vec<String> },
}

pub struct SchemaWatcher<'a> {
    pub cache: &'a SchemaCacheStore,
    pub rules: &'a RuleRegistry,
    pub http: &'a reqwest::Client,
    pub config: &'a SchemaWatcherConfig,
}

impl<'a> SchemaWatcher<'a> {
    pub async fn refresh(&self, fresh: TableSchema) -> RefreshOutcome {
        let previous = self.cache.get(&fresh.table_id).await;
        let table_id = fresh.table_id.clone();
        self.cache.set(fresh.clone()).await;

        let previous = match previous {
            None => {
                tracing::info!(table_id, "schema_bootstrap");
                return RefreshOutcome::Bootstrap;
            }
            Some(p) => p,
        };

        let removed: Vec<String> = fresh.removed_fields(&previous).into_iter().map(str::to_string).collect();
        if removed.is_empty() {
            tracing::info!(table_id, "schema_refresh_noop");
            return RefreshOutcome::Noop;
        }

        tracing::warn!(table_id, removed = ?removed, "schema_changed");
        let disabled_rules = self.apply_policy(&table_id, &removed).await;
        tracing::info!(table_id, disabled = ?disabled_rules, "schema_policy_applied");

        self.notify_risk_webhook(&table_id, &removed).await;

        RefreshOutcome::Changed { removed_fields: removed, disabled_rules }
    }

    /// Runtime-disable every rule on `table_id` whose trigger field is in
    /// `removed_fields`. Does not modify the rules file.
    async fn apply_policy(&self, table_id: &str, removed_fields: &[String]) -> Vec<String> {
        let mut disabled = Vec::new();
        for rule in self.rules.for_table(table_id) {
            if let Some(field) = &rule.trigger.field {
                if removed_fields.iter().any(|r| r == field) {
                    self.cache.disable_rule(&rule.id);
                    disabled.push(rule.id.clone());
                }
            }
        }
        disabled
    }

    async fn notify_risk_webhook(&self, table_id: &str, removed_fields: &[String]) {
        let Some(url) = &self.config.risk_webhook_url else { return };
        let body = serde_json::json!({
            "table_id": table_id,
            "removed_fields": removed_fields,
        });
        let mut builder = self.http.post(url).json(&body);
        if let Some(secret) = &self.config.risk_webhook_secret {
            builder = builder.header("x-webhook-secret", secret);
        }
        if let Err(e) = builder.send().await {
            tracing::warn!(error = %e, "risk webhook delivery failed");
        }
    }

    /// Force-sends the risk webhook for `table_id` regardless of actual
    /// diff state — the `?drill=true&table_id=…` exercise path.
    pub async fn drill(&self, table_id: &str) {
        self.notify_risk_webhook(table_id, &["(drill)".to_string()]).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cw_domain::schema::{FieldKind, FieldSchema};
    use std::io::Write;

    fn schema(table_id: &str, fields: &[&str]) -> TableSchema {
        TableSchema {
            table_id: table_id.into(),
            fields: fields.iter().map(|n| FieldSchema { name: n.to_string(), kind: FieldKind::Text }).collect(),
            refreshed_at: Utc::now(),
        }
    }

    fn registry_with_rule_on(dir: &std::path::Path, field: &str) -> RuleRegistry {
        let yaml = format!(
            "rules:\n  - id: R001\n    enabled: true\n    table: {{ table_id: tbl1 }}\n    trigger: {{ on: [updated], field: {field} }}\n    pipeline: []\n"
        );
        let path = dir.join("rules.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(yaml.as_bytes()).unwrap();
        RuleRegistry::load(&path).unwrap()
    }

    #[tokio::test]
    async fn first_refresh_is_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SchemaCacheStore::new(dir.path());
        let rules = registry_with_rule_on(dir.path(), "status");
        let http = reqwest::Client::new();
        let config = SchemaWatcherConfig { risk_webhook_url: None, risk_webhook_secret: None };
        let watcher = SchemaWatcher { cache: &cache, rules: &rules, http: &http, config: &config };

        let outcome = watcher.refresh(schema("tbl1", &["status"])).await;
        assert_eq!(outcome, RefreshOutcome::Bootstrap);
    }

    #[tokio::test]
    async fn unchanged_schema_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SchemaCacheStore::new(dir.path());
        let rules = registry_with_rule_on(dir.path(), "status");
        let http = reqwest::Client::new();
        let config = SchemaWatcherConfig { risk_webhook_url: None, risk_webhook_secret: None };
        let watcher = SchemaWatcher { cache: &cache, rules: &rules, http: &http, config: &config };

        watcher.refresh(schema("tbl1", &["status"])).await;
        let outcome = watcher.refresh(schema("tbl1", &["status"])).await;
        assert_eq!(outcome, RefreshOutcome::Noop);
    }

    #[tokio::test]
    async fn removed_trigger_field_disables_rule() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SchemaCacheStore::new(dir.path());
        let rules = registry_with_rule_on(dir.path(), "status");
        let http = reqwest::Client::new();
        let config = SchemaWatcherConfig { risk_webhook_url: None, risk_webhook_secret: None };
        let watcher = SchemaWatcher { cache: &cache, rules: &rules, http: &http, config: &config };

        watcher.refresh(schema("tbl1", &["status", "priority"])).await;
        let outcome = watcher.refresh(schema("tbl1", &["priority"])).await;
        match outcome {
            RefreshOutcome::Changed { removed_fields, disabled_rules } => {
                assert_eq!(removed_fields, vec!["status".to_string()]);
                assert_eq!(disabled_rules, vec!["R001".to_string()]);
            }
            other => panic!("expected Changed, got {other:?}"),
        }
        assert!(cache.is_disabled("R001"));
    }
}
