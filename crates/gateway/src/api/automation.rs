//! Automation Worker surface: change-event ingestion, compensation
//! scan/sync, schema refresh, the external webhook trigger, and delay
//! task management.

use std::collections::HashSet;
use std::time::Duration;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use cw_automation::{Dispatcher, DispatcherConfig, DispatchOutcome, ExecutorConfig, Processor, ProcessMode, RefreshOutcome, SchemaWatcher, SchemaWatcherConfig};
use cw_domain::delay::DelayStatus;
use cw_domain::event::EventEnvelope;
use cw_domain::record::{Fields, Locator};
use cw_domain::schema::{FieldKind, FieldSchema, TableSchema};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::error::api_error;
use crate::state::AppState;

pub(crate) fn executor_config(state: &AppState) -> ExecutorConfig {
    ExecutorConfig {
        max_retries: state.config.automation.action_max_retries,
        retry_delay: Duration::from_secs(state.config.automation.action_retry_delay_seconds),
        retry_delay_max: Duration::from_secs(state.config.automation.action_retry_delay_seconds * 8),
        http_allowed_domains: state.config.automation.http_allowed_domains.clone(),
        http_timeout: Duration::from_secs(state.config.automation.http_timeout_seconds),
    }
}

fn dispatcher_config(state: &AppState) -> DispatcherConfig {
    DispatcherConfig {
        api_key: state.config.automation.webhook_api_key.clone(),
        signature_secret: state.config.automation.webhook_signature_secret.clone(),
        timestamp_tolerance_seconds: state.config.automation.webhook_timestamp_tolerance_seconds,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `POST /events` — change-event callback with URL-verification handshake.
pub async fn events(State(state): State<AppState>, headers: HeaderMap, body: axum::body::Bytes) -> axum::response::Response {
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return api_error(StatusCode::BAD_REQUEST, "invalid JSON body"),
    };

    if let Some(challenge) = payload.get("challenge").and_then(|v| v.as_str()) {
        return Json(json!({ "challenge": challenge })).into_response();
    }

    let Some((table_id, record_id, event_type)) = cw_automation::dispatcher::normalize_payload(&payload) else {
        return api_error(StatusCode::BAD_REQUEST, "payload missing table_id/record_id/event_type");
    };
    let app_token = payload.get("app_token").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let event_id = payload.get("event_id").and_then(|v| v.as_str()).map(str::to_string).unwrap_or_else(|| Uuid::new_v4().to_string());

    let envelope = EventEnvelope { event_id: event_id.clone(), event_type, table_id: table_id.clone(), record_id: record_id.clone(), payload: payload.clone(), received_at: Utc::now() };

    let dispatch_cfg = dispatcher_config(&state);
    let dispatcher = Dispatcher { config: &dispatch_cfg, idempotency: &state.idempotency };
    let provided_key = header_str(&headers, "x-api-key");
    let outcome = dispatcher.accept(&envelope, provided_key, None, Utc::now().timestamp(), &body, None).await;

    match outcome {
        DispatchOutcome::AuthFailed => api_error(StatusCode::UNAUTHORIZED, "authentication failed"),
        DispatchOutcome::Duplicate => Json(json!({"status": "duplicate"})).into_response(),
        DispatchOutcome::Accepted => {
            let current_fields: Fields = payload.get("fields").cloned().and_then(|f| serde_json::from_value(f).ok()).unwrap_or_default();
            let cfg = executor_config(&state);
            let processor = Processor {
                rules: &state.rules,
                snapshots: &state.snapshots,
                idempotency: &state.idempotency,
                schema_cache: &state.schema_cache,
                bitable: &state.bitable,
                http: &state.http,
                delay_store: &state.delay_store,
                executor_config: &cfg,
                run_log: &state.run_log,
            };
            let mode = ProcessMode::Event { trigger_on_new_record: state.config.automation.trigger_on_new_record_event };
            let row = processor.process(&event_id, &app_token, &table_id, &record_id, event_type, current_fields, mode).await;
            Json(json!({"status": "processed", "result": row.result})).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TableScopeBody {
    pub app_token: Option<String>,
    pub table_id: Option<String>,
}

fn resolve_scope(state: &AppState, body: &TableScopeBody) -> Option<(String, String)> {
    let app_token = body.app_token.clone().or_else(|| state.config.bitable.default_app_token.clone())?;
    let table_id = body.table_id.clone().or_else(|| state.config.bitable.default_table_id.clone())?;
    Some((app_token, table_id))
}

/// `POST /automation/init` — establish the snapshot baseline for a
/// table's current records without ever firing a rule.
pub async fn init(State(state): State<AppState>, Json(body): Json<TableScopeBody>) -> axum::response::Response {
    run_over_table(&state, body, ProcessMode::Init).await
}

/// `POST /automation/scan` — per-table compensation scan, using the
/// checkpoint to decide whether first-observation records should fire.
pub async fn scan(State(state): State<AppState>, Json(body): Json<TableScopeBody>) -> axum::response::Response {
    let Some((app_token, table_id)) = resolve_scope(&state, &body) else {
        return api_error(StatusCode::BAD_REQUEST, "no app_token/table_id resolvable");
    };
    let checkpoint = state.checkpoints.get(&app_token, &table_id).await;
    let mode = ProcessMode::Scan {
        trigger_on_new_record: state.config.automation.trigger_on_new_record_scan,
        requires_checkpoint: state.config.automation.trigger_on_new_record_scan_requires_checkpoint,
        checkpoint_nonzero: checkpoint.last_cursor > 0,
    };
    let response = run_over_table(&state, body, mode).await;
    state.checkpoints.advance(&app_token, &table_id, checkpoint.last_cursor + 1).await;
    response
}

/// `POST /automation/sync` — full sweep: creates and updates via the
/// same event path as `scan`, plus bounded deletion reconciliation
/// against everything the snapshot store has on record for this table.
pub async fn sync(State(state): State<AppState>, Json(body): Json<TableScopeBody>) -> axum::response::Response {
    let Some((app_token, table_id)) = resolve_scope(&state, &body) else {
        return api_error(StatusCode::BAD_REQUEST, "no app_token/table_id resolvable");
    };

    let records = match state.bitable.search_with_filter(&app_token, &table_id, json!({})).await {
        Ok(r) => r,
        Err(e) => return api_error(StatusCode::BAD_GATEWAY, &e.to_string()),
    };
    let present: HashSet<String> = records.iter().map(|r| r.locator.record_id.clone()).collect();

    let cfg = executor_config(&state);
    let processor = Processor {
        rules: &state.rules,
        snapshots: &state.snapshots,
        idempotency: &state.idempotency,
        schema_cache: &state.schema_cache,
        bitable: &state.bitable,
        http: &state.http,
        delay_store: &state.delay_store,
        executor_config: &cfg,
        run_log: &state.run_log,
    };
    let mode = ProcessMode::Event { trigger_on_new_record: state.config.automation.trigger_on_new_record_event };
    let mut processed = 0usize;
    for record in &records {
        let event_id = Uuid::new_v4().to_string();
        processor.process(&event_id, &app_token, &table_id, &record.locator.record_id, cw_domain::event::EventType::Updated, record.fields.clone(), mode).await;
        processed += 1;
    }

    let mut deleted = 0usize;
    if state.config.automation.sync_deletions_enabled {
        let known = state.snapshots.keys_for_table(&app_token, &table_id).await;
        for record_id in known {
            if deleted >= state.config.automation.sync_deletions_max_per_run as usize {
                break;
            }
            if !present.contains(&record_id) {
                state.snapshots.remove(&Locator::new(app_token.clone(), table_id.clone(), record_id)).await;
                deleted += 1;
            }
        }
    }

    Json(json!({"processed": processed, "deleted": deleted})).into_response()
}

async fn run_over_table(state: &AppState, body: TableScopeBody, mode: ProcessMode) -> axum::response::Response {
    let Some((app_token, table_id)) = resolve_scope(state, &body) else {
        return api_error(StatusCode::BAD_REQUEST, "no app_token/table_id resolvable");
    };
    let records = match state.bitable.search_with_filter(&app_token, &table_id, json!({})).await {
        Ok(r) => r,
        Err(e) => return api_error(StatusCode::BAD_GATEWAY, &e.to_string()),
    };

    let cfg = executor_config(state);
    let processor = Processor {
        rules: &state.rules,
        snapshots: &state.snapshots,
        idempotency: &state.idempotency,
        schema_cache: &state.schema_cache,
        bitable: &state.bitable,
        http: &state.http,
        delay_store: &state.delay_store,
        executor_config: &cfg,
        run_log: &state.run_log,
    };
    let mut processed = 0usize;
    for record in &records {
        let event_id = Uuid::new_v4().to_string();
        processor.process(&event_id, &app_token, &table_id, &record.locator.record_id, cw_domain::event::EventType::Updated, record.fields.clone(), mode).await;
        processed += 1;
    }
    Json(json!({"processed": processed})).into_response()
}

#[derive(Debug, Deserialize)]
pub struct SchemaRefreshQuery {
    #[serde(default)]
    pub drill: bool,
    pub table_id: Option<String>,
}

/// `POST /automation/schema/refresh` — samples the table's current
/// records to infer its field schema (the tabular backend exposes no
/// dedicated schema endpoint), diffs against the cache, and applies
/// runtime policy. `?drill=true&table_id=…` force-exercises the risk
/// webhook regardless of whether anything actually changed.
pub async fn schema_refresh(State(state): State<AppState>, Query(q): Query<SchemaRefreshQuery>, Json(body): Json<TableScopeBody>) -> axum::response::Response {
    let watcher_cfg = SchemaWatcherConfig {
        risk_webhook_url: state.config.automation.schema_webhook_url.clone(),
        risk_webhook_secret: state.config.automation.schema_webhook_secret.clone(),
    };
    let watcher = SchemaWatcher { cache: &state.schema_cache, rules: &state.rules, http: &state.http, config: &watcher_cfg };

    if q.drill {
        if !state.config.automation.schema_webhook_drill {
            return api_error(StatusCode::FORBIDDEN, "drill mode is disabled");
        }
        let Some(table_id) = q.table_id.clone() else {
            return api_error(StatusCode::BAD_REQUEST, "drill requires ?table_id=");
        };
        watcher.drill(&table_id).await;
        return Json(json!({"status": "drilled", "table_id": table_id})).into_response();
    }

    let Some((app_token, table_id)) = resolve_scope(&state, &body) else {
        return api_error(StatusCode::BAD_REQUEST, "no app_token/table_id resolvable");
    };
    let sample = match state.bitable.search_with_filter(&app_token, &table_id, json!({})).await {
        Ok(r) => r,
        Err(e) => return api_error(StatusCode::BAD_GATEWAY, &e.to_string()),
    };
    let mut field_names: Vec<String> = Vec::new();
    for record in sample.iter().take(20) {
        for name in record.fields.keys() {
            if !field_names.contains(name) {
                field_names.push(name.clone());
            }
        }
    }
    let fresh = TableSchema {
        table_id: table_id.clone(),
        fields: field_names.into_iter().map(|name| FieldSchema { name, kind: FieldKind::Unknown }).collect(),
        refreshed_at: Utc::now(),
    };
    let outcome = watcher.refresh(fresh).await;
    Json(serde_json::to_value(describe_outcome(outcome)).unwrap_or_default()).into_response()
}

fn describe_outcome(outcome: RefreshOutcome) -> serde_json::Value {
    match outcome {
        RefreshOutcome::Bootstrap => json!({"outcome": "bootstrap"}),
        RefreshOutcome::Noop => json!({"outcome": "noop"}),
        RefreshOutcome::Changed { removed_fields, disabled_rules } => json!({"outcome": "changed", "removed_fields": removed_fields, "disabled_rules": disabled_rules}),
    }
}

/// `POST /automation/webhook/{rule_id}` — external trigger. Authentication
/// is mandatory regardless of global config (an unconfigured webhook
/// secret means the route always rejects, rather than running open).
pub async fn trigger_webhook(State(state): State<AppState>, AxumPath(rule_id): AxumPath<String>, headers: HeaderMap, body: axum::body::Bytes) -> axum::response::Response {
    let Some(rule) = state.rules.get(&rule_id) else {
        return api_error(StatusCode::NOT_FOUND, "unknown rule");
    };
    if !rule.is_active() {
        return api_error(StatusCode::CONFLICT, "rule is disabled");
    }

    let provided_key = header_str(&headers, "x-api-key");
    let auth_ok = match &state.config.automation.webhook_api_key {
        Some(expected) => cw_automation::webhook_auth::check_static_token(provided_key, expected).is_ok(),
        None => false,
    };
    if !auth_ok {
        if let Some(secret) = &state.config.automation.webhook_signature_secret {
            let ts: i64 = header_str(&headers, "x-timestamp").and_then(|v| v.parse().ok()).unwrap_or(0);
            let sig = header_str(&headers, "x-signature").unwrap_or_default();
            if cw_automation::webhook_auth::verify_hmac(secret, ts, Utc::now().timestamp(), state.config.automation.webhook_timestamp_tolerance_seconds, &body, sig).is_err() {
                return api_error(StatusCode::UNAUTHORIZED, "signature verification failed");
            }
        } else {
            return api_error(StatusCode::UNAUTHORIZED, "no webhook authentication configured");
        }
    }

    let payload: serde_json::Value = serde_json::from_slice(&body).unwrap_or_else(|_| json!({}));
    let fields: Fields = payload.get("fields").cloned().and_then(|f| serde_json::from_value(f).ok()).unwrap_or_default();
    let cfg = executor_config(&state);
    for action in &rule.pipeline {
        cw_automation::executors::execute(
            action,
            payload.get("app_token").and_then(|v| v.as_str()).unwrap_or_default(),
            payload.get("record_id").and_then(|v| v.as_str()).unwrap_or_default(),
            &fields,
            &state.bitable,
            &state.http,
            &state.delay_store,
            &rule.id,
            &cfg,
        )
        .await;
    }

    Json(json!({"status": "triggered", "rule_id": rule_id})).into_response()
}

/// `GET /automation/delay/tasks`
pub async fn list_delay_tasks(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({"tasks": state.delay_store.list().await}))
}

/// `POST /automation/delay/{id}/cancel`
pub async fn cancel_delay_task(State(state): State<AppState>, AxumPath(id): AxumPath<Uuid>) -> axum::response::Response {
    if state.delay_store.cancel(&id).await {
        Json(json!({"status": "cancelled"})).into_response()
    } else {
        api_error(StatusCode::NOT_FOUND, "task not found or not cancellable")
    }
}

/// `GET /automation/auth/health` — probes token acquisition and upstream
/// connectivity without touching any table.
pub async fn auth_health(State(state): State<AppState>) -> axum::response::Response {
    let app_token = state.config.bitable.default_app_token.clone().unwrap_or_default();
    match state.bitable.list_tables(&app_token).await {
        Ok(_) => Json(json!({"status": "ok"})).into_response(),
        Err(e) => api_error(StatusCode::BAD_GATEWAY, &e.to_string()),
    }
}

pub async fn metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let recent = state.run_log.recent(50);
    let success = recent.iter().filter(|r| matches!(r.result, cw_domain::runlog::RunResult::Success)).count();
    let failed = recent.iter().filter(|r| matches!(r.result, cw_domain::runlog::RunResult::Failed)).count();
    let pending_delays = state.delay_store.list().await.into_iter().filter(|t| t.status == DelayStatus::Scheduled).count();
    Json(json!({
        "recent_runs": recent.len(),
        "recent_success": success,
        "recent_failed": failed,
        "dead_letters": state.run_log.dead_letters().len(),
        "delay_tasks_pending": pending_delays,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_str_reads_existing_header_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "secret".parse().unwrap());
        assert_eq!(header_str(&headers, "x-api-key"), Some("secret"));
        assert_eq!(header_str(&headers, "X-Api-Key"), Some("secret"));
    }

    #[test]
    fn header_str_missing_header_is_none() {
        let headers = HeaderMap::new();
        assert_eq!(header_str(&headers, "x-api-key"), None);
    }

    #[test]
    fn describe_outcome_bootstrap() {
        let value = describe_outcome(RefreshOutcome::Bootstrap);
        assert_eq!(value, json!({"outcome": "bootstrap"}));
    }

    #[test]
    fn describe_outcome_noop() {
        let value = describe_outcome(RefreshOutcome::Noop);
        assert_eq!(value, json!({"outcome": "noop"}));
    }

    #[test]
    fn describe_outcome_changed_carries_removed_fields_and_disabled_rules() {
        let value = describe_outcome(RefreshOutcome::Changed {
            removed_fields: vec!["status".to_string()],
            disabled_rules: vec!["rule-1".to_string()],
        });
        assert_eq!(value, json!({"outcome": "changed", "removed_fields": ["status"], "disabled_rules": ["rule-1"]}));
    }

    #[test]
    fn table_scope_body_deserializes_with_both_fields_absent() {
        let body: TableScopeBody = serde_json::from_value(json!({})).unwrap();
        assert!(body.app_token.is_none());
        assert!(body.table_id.is_none());
    }

    #[test]
    fn schema_refresh_query_deserializes_from_json_with_drill_defaulted() {
        let query: SchemaRefreshQuery = serde_json::from_value(json!({"table_id": "tbl1"})).unwrap();
        assert!(!query.drill);
        assert_eq!(query.table_id.as_deref(), Some("tbl1"));
    }
}
