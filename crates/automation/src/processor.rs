//! Automation Processor — fetch → diff → match → execute → persist for
//! one `(app_token, table_id, record_id, event_type)`.

use chrono::Utc;
use cw_bitable::BitableClient;
use cw_domain::event::{business_idempotency_key, EventType};
use cw_domain::record::{Fields, Locator};
use cw_domain::rule::Rule;
use cw_domain::runlog::{ActionDetail, DeadLetterEntry, RunLogRow, RunResult};

use crate::executors::{execute, ExecutorConfig};
use crate::match_engine::trigger_matches;
use crate::rules::RuleRegistry;
use crate::store::delay::DelayStore;
use crate::store::idempotency::IdempotencyStore;
use crate::store::runlog::RunLogStore;
use crate::store::schema_cache::SchemaCacheStore;
use crate::store::snapshot::SnapshotStore;

/// Whether this call is establishing the initial snapshot baseline — in
/// that case rules never fire regardless of diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    Init,
    Event { trigger_on_new_record: bool },
    Scan { trigger_on_new_record: bool, requires_checkpoint: bool, checkpoint_nonzero: bool },
}

pub struct Processor<'a> {
    pub rules: &'a RuleRegistry,
    pub snapshots: &'a SnapshotStore,
    pub idempotency: &'a IdempotencyStore,
    pub schema_cache: &'a SchemaCacheStore,
    pub bitable: &'a BitableClient,
    pub http: &'a reqwest::Client,
    pub delay_store: &'a DelayStore,
    pub executor_config: &'a ExecutorConfig,
    pub run_log: &'a RunLogStore,
}

/// Active rules (enabled, not runtime-disabled) registered for `table_id`
/// whose trigger fires on `event_type`.
fn applicable_rules(registry: &RuleRegistry, schema_cache: &SchemaCacheStore, table_id: &str, event_type: EventType) -> Vec<Rule> {
    registry
        .for_table(table_id)
        .into_iter()
        .filter(|r| r.is_active() && !schema_cache.is_disabled(&r.id))
        .filter(|r| r.trigger.on.iter().any(|on| event_type.matches_trigger_on(*on)))
        .collect()
}

impl<'a> Processor<'a> {
    pub async fn process(
        &self,
        event_id: &str,
        app_token: &str,
        table_id: &str,
        record_id: &str,
        event_type: EventType,
        current_fields: Fields,
        mode: ProcessMode,
    ) -> RunLogRow {
        let started = Utc::now();
        let locator = Locator::new(app_token, table_id, record_id);
        let candidates = applicable_rules(self.rules, self.schema_cache, table_id, event_type);

        let previous = self.snapshots.load(&locator).await;
        let is_first_observation = previous.is_none();

        if matches!(mode, ProcessMode::Init) {
            self.snapshots.save(&locator, current_fields).await;
            let row = no_match_row(started, event_id, app_token, table_id, record_id, vec![]);
            self.run_log.append(row.clone());
            return row;
        }

        if is_first_observation {
            let should_fire = match mode {
                ProcessMode::Event { trigger_on_new_record } => trigger_on_new_record,
                ProcessMode::Scan { trigger_on_new_record, requires_checkpoint, checkpoint_nonzero } => {
                    trigger_on_new_record && (!requires_checkpoint || checkpoint_nonzero)
                }
                ProcessMode::Init => false,
            };
            if !should_fire {
                self.snapshots.save(&locator, current_fields).await;
                let row = no_match_row(started, event_id, app_token, table_id, record_id, vec![]);
                self.run_log.append(row.clone());
                return row;
            }
        }

        let changes = cw_domain::record::diff_fields(previous.as_ref().map(|e| &e.fields), &current_fields);
        if changes.is_empty() {
            self.snapshots.save(&locator, current_fields).await;
            let row = no_match_row(started, event_id, app_token, table_id, record_id, vec![]);
            self.run_log.append(row.clone());
            return row;
        }

        let mut rules_evaluated = Vec::new();
        let mut rules_matched = Vec::new();
        let mut actions_executed = Vec::new();
        let mut actions_detail = Vec::new();
        let mut log_messages = Vec::new();
        let mut error: Option<String> = None;
        let mut total_retries = 0u32;
        let mut sent_to_dead_letter = false;
        let mut any_failed = false;
        let mut any_matched = false;

        for rule in &candidates {
            rules_evaluated.push(rule.id.clone());
            if !trigger_matches(&rule.trigger, &changes, &current_fields) {
                continue;
            }
            rules_matched.push(rule.id.clone());
            any_matched = true;

            let changed_names: Vec<&str> = changes.iter().map(|c| c.field_name.as_str()).collect();
            let biz_key = business_idempotency_key(&rule.id, table_id, record_id, &changed_names);
            if self.idempotency.has_succeeded(&biz_key).await {
                continue;
            }

            let mut rule_failed = false;
            for action in &rule.pipeline {
                let outcome = execute(
                    action,
                    app_token,
                    record_id,
                    &current_fields,
                    self.bitable,
                    self.http,
                    self.delay_store,
                    &rule.id,
                    self.executor_config,
                )
                .await;

                actions_executed.push(action.type_name().to_string());
                actions_detail.push(ActionDetail {
                    action_type: action.type_name().to_string(),
                    retry_count: outcome.retry_count,
                    duration_ms: outcome.duration_ms,
                });
                total_retries += outcome.retry_count;
                if let Some(rendered) = &outcome.rendered {
                    log_messages.push(rendered.clone());
                }

                if !outcome.ok {
                    any_failed = true;
                    rule_failed = true;
                    error = outcome.error.clone();
                    sent_to_dead_letter = true;
                    self.run_log.dead_letter(DeadLetterEntry {
                        id: uuid::Uuid::new_v4(),
                        rule_id: rule.id.clone(),
                        table_id: table_id.to_string(),
                        record_id: record_id.to_string(),
                        action_type: action.type_name().to_string(),
                        final_error: outcome.error.unwrap_or_default(),
                        retry_count: outcome.retry_count,
                        created_at: Utc::now(),
                    });
                    break; // abort rest of this rule's pipeline
                }
            }

            // Only a pipeline that ran to completion earns the permanent
            // record; a failed one must stay claimable for redelivery.
            if !rule_failed {
                self.idempotency.record_success(&biz_key).await;
            }
        }

        self.snapshots.save(&locator, current_fields).await;

        let result = if !any_matched {
            RunResult::NoMatch
        } else if any_failed {
            if rules_matched.len() > 1 {
                RunResult::Partial
            } else {
                RunResult::Failed
            }
        } else {
            RunResult::Success
        };

        let row = RunLogRow {
            timestamp: started,
            event_id: event_id.to_string(),
            rule_id: rules_matched.first().cloned().unwrap_or_default(),
            app_token: app_token.to_string(),
            table_id: table_id.to_string(),
            record_id: record_id.to_string(),
            rules_evaluated,
            rules_matched,
            trigger_field: changes.first().map(|c| c.field_name.clone()),
            changed: changes.first().cloned(),
            actions_executed,
            actions_detail,
            log_messages,
            result,
            error,
            retry_count: total_retries,
            sent_to_dead_letter,
            duration_ms: (Utc::now() - started).num_milliseconds().max(0) as u64,
        };
        self.run_log.append(row.clone());
        row
    }
}

fn no_match_row(started: chrono::DateTime<Utc>, event_id: &str, app_token: &str, table_id: &str, record_id: &str, evaluated: Vec<String>) -> RunLogRow {
    RunLogRow {
        timestamp: started,
        event_id: event_id.to_string(),
        rule_id: String::new(),
        app_token: app_token.to_string(),
        table_id: table_id.to_string(),
        record_id: record_id.to_string(),
        rules_evaluated: evaluated,
        rules_matched: vec![],
        trigger_field: None,
        changed: None,
        actions_executed: vec![],
        actions_detail: vec![],
        log_messages: vec![],
        result: RunResult::NoMatch,
        error: None,
        retry_count: 0,
        sent_to_dead_letter: false,
        duration_ms: (Utc::now() - started).num_milliseconds().max(0) as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_domain::record::Value;
    use std::io::Write;

    fn setup(dir: &std::path::Path, yaml: &str) -> (RuleRegistry, SnapshotStore, IdempotencyStore, SchemaCacheStore, DelayStore, RunLogStore) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(yaml.as_bytes()).unwrap();
        let path = f.into_temp_path();
        let rules = RuleRegistry::load(&path).unwrap();
        (
            rules,
            SnapshotStore::new(dir),
            IdempotencyStore::new(dir, 3600),
            SchemaCacheStore::new(dir),
            DelayStore::new(dir),
            RunLogStore::new(dir),
        )
    }

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs.iter().map(|(k, v)| (k.to_string(), Value::Text(v.to_string()))).collect()
    }

    fn bitable() -> BitableClient {
        let tokens = std::sync::Arc::new(cw_bitable::TokenCache::new("id", "secret", "http://127.0.0.1:0"));
        BitableClient::new("http://127.0.0.1:0", tokens, 1).unwrap()
    }

    #[tokio::test]
    async fn first_observation_persists_snapshot_without_firing_rules() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
rules:
  - id: R001
    enabled: true
    table: { table_id: tbl1 }
    trigger: { on: [updated], field: status }
    pipeline: [{ type: log.write, template: "x" }]
"#;
        let (rules, snapshots, idempotency, schema_cache, delay_store, run_log) = setup(dir.path(), yaml);
        let client = bitable();
        let http = reqwest::Client::new();
        let cfg = ExecutorConfig {
            max_retries: 1,
            retry_delay: std::time::Duration::from_millis(1),
            retry_delay_max: std::time::Duration::from_millis(5),
            http_allowed_domains: vec![],
            http_timeout: std::time::Duration::from_secs(1),
        };
        let processor = Processor {
            rules: &rules,
            snapshots: &snapshots,
            idempotency: &idempotency,
            schema_cache: &schema_cache,
            bitable: &client,
            http: &http,
            delay_store: &delay_store,
            executor_config: &cfg,
            run_log: &run_log,
        };

        let row = processor
            .process(
                "evt1",
                "app1",
                "tbl1",
                "rec1",
                EventType::Updated,
                fields(&[("status", "open")]),
                ProcessMode::Event { trigger_on_new_record: false },
            )
            .await;
        assert_eq!(row.result, RunResult::NoMatch);
        assert!(row.rules_matched.is_empty());
        assert!(snapshots.load(&Locator::new("app1", "tbl1", "rec1")).await.is_some());
    }

    #[tokio::test]
    async fn matching_rule_runs_log_write_and_reports_success() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
rules:
  - id: R001
    enabled: true
    table: { table_id: tbl1 }
    trigger: { on: [updated], field: status }
    pipeline: [{ type: log.write, template: "now {status}" }]
"#;
        let (rules, snapshots, idempotency, schema_cache, delay_store, run_log) = setup(dir.path(), yaml);
        let locator = Locator::new("app1", "tbl1", "rec1");
        snapshots.save(&locator, fields(&[("status", "open")])).await;

        let client = bitable();
        let http = reqwest::Client::new();
        let cfg = ExecutorConfig {
            max_retries: 1,
            retry_delay: std::time::Duration::from_millis(1),
            retry_delay_max: std::time::Duration::from_millis(5),
            http_allowed_domains: vec![],
            http_timeout: std::time::Duration::from_secs(1),
        };
        let processor = Processor {
            rules: &rules,
            snapshots: &snapshots,
            idempotency: &idempotency,
            schema_cache: &schema_cache,
            bitable: &client,
            http: &http,
            delay_store: &delay_store,
            executor_config: &cfg,
            run_log: &run_log,
        };

        let row = processor
            .process(
                "evt1",
                "app1",
                "tbl1",
                "rec1",
                EventType::Updated,
                fields(&[("status", "done")]),
                ProcessMode::Event { trigger_on_new_record: false },
            )
            .await;
        assert_eq!(row.result, RunResult::Success);
        assert_eq!(row.rules_matched, vec!["R001".to_string()]);
        assert_eq!(row.actions_executed, vec!["log.write".to_string()]);
        assert_eq!(row.log_messages, vec!["now done".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_event_for_same_change_is_skipped_by_business_idempotency() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
rules:
  - id: R001
    enabled: true
    table: { table_id: tbl1 }
    trigger: { on: [updated], field: status }
    pipeline: [{ type: log.write, template: "x" }]
"#;
        let (rules, snapshots, idempotency, schema_cache, delay_store, run_log) = setup(dir.path(), yaml);
        let locator = Locator::new("app1", "tbl1", "rec1");
        snapshots.save(&locator, fields(&[("status", "open")])).await;

        let client = bitable();
        let http = reqwest::Client::new();
        let cfg = ExecutorConfig {
            max_retries: 1,
            retry_delay: std::time::Duration::from_millis(1),
            retry_delay_max: std::time::Duration::from_millis(5),
            http_allowed_domains: vec![],
            http_timeout: std::time::Duration::from_secs(1),
        };
        let processor = Processor {
            rules: &rules,
            snapshots: &snapshots,
            idempotency: &idempotency,
            schema_cache: &schema_cache,
            bitable: &client,
            http: &http,
            delay_store: &delay_store,
            executor_config: &cfg,
            run_log: &run_log,
        };

        let row1 = processor
            .process("evt1", "app1", "tbl1", "rec1", EventType::Updated, fields(&[("status", "done")]), ProcessMode::Event { trigger_on_new_record: false })
            .await;
        assert_eq!(row1.result, RunResult::Success);

        // Snapshot now reflects "done"; re-feed the exact same target
        // fields to simulate a redelivered event after a rollback+retry.
        snapshots.save(&locator, fields(&[("status", "open")])).await;
        let row2 = processor
            .process("evt2", "app1", "tbl1", "rec1", EventType::Updated, fields(&[("status", "done")]), ProcessMode::Event { trigger_on_new_record: false })
            .await;
        assert!(row2.rules_matched.is_empty() || row2.actions_executed.is_empty());
    }

    #[tokio::test]
    async fn failed_pipeline_leaves_the_business_key_unclaimed_for_redelivery() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
rules:
  - id: R001
    enabled: true
    table: { table_id: tbl1 }
    trigger: { on: [updated], field: status }
    pipeline: [{ type: http.request, method: POST, url: "http://localhost/hook" }]
"#;
        let (rules, snapshots, idempotency, schema_cache, delay_store, run_log) = setup(dir.path(), yaml);
        let locator = Locator::new("app1", "tbl1", "rec1");
        snapshots.save(&locator, fields(&[("status", "open")])).await;

        let client = bitable();
        let http = reqwest::Client::new();
        let cfg = ExecutorConfig {
            max_retries: 1,
            retry_delay: std::time::Duration::from_millis(1),
            retry_delay_max: std::time::Duration::from_millis(5),
            // Host not on the allow-list: the action fails before any
            // network call, deterministically, every run.
            http_allowed_domains: vec!["example.com".into()],
            http_timeout: std::time::Duration::from_secs(1),
        };
        let processor = Processor {
            rules: &rules,
            snapshots: &snapshots,
            idempotency: &idempotency,
            schema_cache: &schema_cache,
            bitable: &client,
            http: &http,
            delay_store: &delay_store,
            executor_config: &cfg,
            run_log: &run_log,
        };

        let row1 = processor
            .process("evt1", "app1", "tbl1", "rec1", EventType::Updated, fields(&[("status", "done")]), ProcessMode::Event { trigger_on_new_record: false })
            .await;
        assert_eq!(row1.result, RunResult::Failed);
        assert_eq!(row1.rules_matched, vec!["R001".to_string()]);

        // Redelivery of the exact same change-set must retry the pipeline
        // rather than be skipped as already successful.
        snapshots.save(&locator, fields(&[("status", "open")])).await;
        let row2 = processor
            .process("evt2", "app1", "tbl1", "rec1", EventType::Updated, fields(&[("status", "done")]), ProcessMode::Event { trigger_on_new_record: false })
            .await;
        assert_eq!(row2.result, RunResult::Failed);
        assert_eq!(row2.rules_matched, vec!["R001".to_string()]);
    }
}
