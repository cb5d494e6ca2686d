//! Tool Server surface: `GET /mcp/tools`, `POST /mcp/tools/{tool_name}`,
//! `GET /mcp/metrics`.
//!
//! Each tool is a declared [`ToolDefinition`] plus a dispatch arm against
//! the shared [`cw_bitable::BitableClient`] — the tabular backend is the
//! only upstream this tool surface wraps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::Json;
use cw_domain::error::ErrorCode;
use cw_domain::record::{Fields, Locator};
use cw_domain::tool::{ToolDefinition, ToolInvokeRequest, ToolResponse};
use serde_json::json;

use crate::state::AppState;

pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
    invocations: AtomicU64,
    failures: AtomicU64,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let definitions = vec![
            ToolDefinition::new(
                "feishu.v1.bitable.list_tables",
                "list the tables in an app",
                json!({"type": "object", "properties": {"app_token": {"type": "string"}}, "required": ["app_token"]}),
            ),
            ToolDefinition::new(
                "feishu.v1.bitable.search",
                "search records with a raw backend filter",
                json!({
                    "type": "object",
                    "properties": {"app_token": {"type": "string"}, "table_id": {"type": "string"}, "filter": {"type": "object"}},
                    "required": ["app_token", "table_id"],
                }),
            ),
            ToolDefinition::new(
                "feishu.v1.bitable.search_exact",
                "search records whose field exactly equals a value",
                json!({
                    "type": "object",
                    "properties": {"app_token": {"type": "string"}, "table_id": {"type": "string"}, "field": {"type": "string"}, "value": {"type": "string"}},
                    "required": ["app_token", "table_id", "field", "value"],
                }),
            ),
            ToolDefinition::new(
                "feishu.v1.bitable.search_keyword",
                "search records whose field contains a keyword",
                json!({
                    "type": "object",
                    "properties": {"app_token": {"type": "string"}, "table_id": {"type": "string"}, "field": {"type": "string"}, "keyword": {"type": "string"}},
                    "required": ["app_token", "table_id", "field", "keyword"],
                }),
            ),
            ToolDefinition::new(
                "feishu.v1.bitable.search_person",
                "search records whose person field contains an opaque user id",
                json!({
                    "type": "object",
                    "properties": {"app_token": {"type": "string"}, "table_id": {"type": "string"}, "field": {"type": "string"}, "open_id": {"type": "string"}},
                    "required": ["app_token", "table_id", "field", "open_id"],
                }),
            ),
            ToolDefinition::new(
                "feishu.v1.bitable.search_date_range",
                "search records whose date field falls within an epoch-ms range",
                json!({
                    "type": "object",
                    "properties": {
                        "app_token": {"type": "string"}, "table_id": {"type": "string"}, "field": {"type": "string"},
                        "from_ms": {"type": "integer"}, "to_ms": {"type": "integer"},
                    },
                    "required": ["app_token", "table_id", "field", "from_ms", "to_ms"],
                }),
            ),
            ToolDefinition::new(
                "feishu.v1.bitable.record.get",
                "fetch one record by id",
                json!({
                    "type": "object",
                    "properties": {"app_token": {"type": "string"}, "table_id": {"type": "string"}, "record_id": {"type": "string"}},
                    "required": ["app_token", "table_id", "record_id"],
                }),
            ),
            ToolDefinition::new(
                "feishu.v1.bitable.record.create",
                "create a record",
                json!({
                    "type": "object",
                    "properties": {"app_token": {"type": "string"}, "table_id": {"type": "string"}, "fields": {"type": "object"}},
                    "required": ["app_token", "table_id", "fields"],
                }),
            ),
            ToolDefinition::new(
                "feishu.v1.bitable.record.update",
                "update a record's fields",
                json!({
                    "type": "object",
                    "properties": {"app_token": {"type": "string"}, "table_id": {"type": "string"}, "record_id": {"type": "string"}, "fields": {"type": "object"}},
                    "required": ["app_token", "table_id", "record_id", "fields"],
                }),
            ),
            ToolDefinition::new(
                "feishu.v1.bitable.record.delete",
                "delete a record",
                json!({
                    "type": "object",
                    "properties": {"app_token": {"type": "string"}, "table_id": {"type": "string"}, "record_id": {"type": "string"}},
                    "required": ["app_token", "table_id", "record_id"],
                }),
            ),
            ToolDefinition::new(
                "feishu.v1.doc.search",
                "search linked documents",
                json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
            ),
        ];
        Self { definitions, invocations: AtomicU64::new(0), failures: AtomicU64::new(0) }
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    fn find(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn list_tools(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "tools": state.tools.definitions() }))
}

pub async fn metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "invocations": state.tools.invocations.load(Ordering::Relaxed),
        "failures": state.tools.failures.load(Ordering::Relaxed),
    }))
}

fn fields_from_value(value: &serde_json::Value) -> Fields {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

pub async fn invoke_tool(
    State(state): State<AppState>,
    AxumPath(tool_name): AxumPath<String>,
    Json(req): Json<ToolInvokeRequest>,
) -> (StatusCode, Json<ToolResponse>) {
    let Some(def) = state.tools.find(&tool_name) else {
        return (StatusCode::NOT_FOUND, Json(ToolResponse::err(ErrorCode::Mcp002, format!("unknown tool `{tool_name}`"))));
    };

    if let Err(reason) = def.validate_params(&req.params) {
        return (StatusCode::BAD_REQUEST, Json(ToolResponse::err(ErrorCode::Mcp001, reason)));
    }

    state.tools.invocations.fetch_add(1, Ordering::Relaxed);
    match dispatch(&state, &tool_name, &req.params).await {
        Ok(data) => (StatusCode::OK, Json(ToolResponse::ok(data))),
        Err(err) => {
            state.tools.failures.fetch_add(1, Ordering::Relaxed);
            let status = match err.code() {
                ErrorCode::Mcp002 => StatusCode::NOT_FOUND,
                ErrorCode::Mcp003 => StatusCode::FORBIDDEN,
                _ => StatusCode::BAD_GATEWAY,
            };
            (status, Json(ToolResponse::err(err.code(), err.to_string())))
        }
    }
}

async fn dispatch(state: &AppState, tool_name: &str, params: &serde_json::Value) -> cw_domain::error::Result<serde_json::Value> {
    let bitable = Arc::clone(&state.bitable);
    let app_token = |p: &serde_json::Value| -> String { p.get("app_token").and_then(|v| v.as_str()).unwrap_or_default().to_string() };
    let table_id = |p: &serde_json::Value| -> String { p.get("table_id").and_then(|v| v.as_str()).unwrap_or_default().to_string() };
    let record_id = |p: &serde_json::Value| -> String { p.get("record_id").and_then(|v| v.as_str()).unwrap_or_default().to_string() };
    let field = |p: &serde_json::Value| -> String { p.get("field").and_then(|v| v.as_str()).unwrap_or_default().to_string() };

    match tool_name {
        "feishu.v1.bitable.list_tables" => {
            let tables = bitable.list_tables(&app_token(params)).await?;
            Ok(serde_json::to_value(tables).unwrap_or_default())
        }
        "feishu.v1.bitable.search" => {
            let filter = params.get("filter").cloned().unwrap_or_else(|| json!({}));
            let records = bitable.search_with_filter(&app_token(params), &table_id(params), filter).await?;
            Ok(serde_json::to_value(records).unwrap_or_default())
        }
        "feishu.v1.bitable.search_exact" => {
            let value = params.get("value").and_then(|v| v.as_str()).unwrap_or_default();
            let records = bitable.search_exact(&app_token(params), &table_id(params), &field(params), value).await?;
            Ok(serde_json::to_value(records).unwrap_or_default())
        }
        "feishu.v1.bitable.search_keyword" => {
            let keyword = params.get("keyword").and_then(|v| v.as_str()).unwrap_or_default();
            let records = bitable.search_keyword(&app_token(params), &table_id(params), &field(params), keyword).await?;
            Ok(serde_json::to_value(records).unwrap_or_default())
        }
        "feishu.v1.bitable.search_person" => {
            let open_id = params.get("open_id").and_then(|v| v.as_str()).unwrap_or_default();
            let records = bitable.search_person(&app_token(params), &table_id(params), &field(params), open_id).await?;
            Ok(serde_json::to_value(records).unwrap_or_default())
        }
        "feishu.v1.bitable.search_date_range" => {
            let from_ms = params.get("from_ms").and_then(|v| v.as_i64()).unwrap_or_default();
            let to_ms = params.get("to_ms").and_then(|v| v.as_i64()).unwrap_or_default();
            let records = bitable.search_date_range(&app_token(params), &table_id(params), &field(params), from_ms, to_ms).await?;
            Ok(serde_json::to_value(records).unwrap_or_default())
        }
        "feishu.v1.bitable.record.get" => {
            let locator = Locator::new(app_token(params), table_id(params), record_id(params));
            let record = bitable.get_record(&locator).await?;
            Ok(serde_json::to_value(record).unwrap_or_default())
        }
        "feishu.v1.bitable.record.create" => {
            let fields = fields_from_value(params.get("fields").unwrap_or(&json!({})));
            let record = bitable.create_record(&app_token(params), &table_id(params), &fields).await?;
            Ok(serde_json::to_value(record).unwrap_or_default())
        }
        "feishu.v1.bitable.record.update" => {
            let locator = Locator::new(app_token(params), table_id(params), record_id(params));
            let fields = fields_from_value(params.get("fields").unwrap_or(&json!({})));
            let record = bitable.update_record(&locator, &fields).await?;
            Ok(serde_json::to_value(record).unwrap_or_default())
        }
        "feishu.v1.bitable.record.delete" => {
            let locator = Locator::new(app_token(params), table_id(params), record_id(params));
            bitable.delete_record(&locator).await?;
            Ok(json!({"deleted": true}))
        }
        "feishu.v1.doc.search" => {
            let query = params.get("query").and_then(|v| v.as_str()).unwrap_or_default();
            let results = bitable.doc_search(query).await?;
            Ok(serde_json::to_value(results).unwrap_or_default())
        }
        other => Err(cw_domain::error::Error::coded(ErrorCode::Mcp002, format!("no handler registered for `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_declares_every_feishu_v1_tool() {
        let registry = ToolRegistry::new();
        let names: Vec<&str> = registry.definitions().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names.len(), 11);
        assert!(names.contains(&"feishu.v1.bitable.list_tables"));
        assert!(names.contains(&"feishu.v1.bitable.search"));
        assert!(names.contains(&"feishu.v1.bitable.search_exact"));
        assert!(names.contains(&"feishu.v1.bitable.search_keyword"));
        assert!(names.contains(&"feishu.v1.bitable.search_person"));
        assert!(names.contains(&"feishu.v1.bitable.search_date_range"));
        assert!(names.contains(&"feishu.v1.bitable.record.get"));
        assert!(names.contains(&"feishu.v1.bitable.record.create"));
        assert!(names.contains(&"feishu.v1.bitable.record.update"));
        assert!(names.contains(&"feishu.v1.bitable.record.delete"));
        assert!(names.contains(&"feishu.v1.doc.search"));
    }

    #[test]
    fn find_is_case_sensitive_and_exact() {
        let registry = ToolRegistry::new();
        assert!(registry.find("feishu.v1.bitable.record.get").is_some());
        assert!(registry.find("feishu.v1.bitable.record.GET").is_none());
        assert!(registry.find("nonexistent.tool").is_none());
    }

    #[test]
    fn record_get_rejects_missing_required_param() {
        let registry = ToolRegistry::new();
        let def = registry.find("feishu.v1.bitable.record.get").unwrap();
        let err = def.validate_params(&json!({"app_token": "a", "table_id": "t"})).unwrap_err();
        assert!(err.contains("record_id"));
    }

    #[test]
    fn search_accepts_payload_without_optional_filter() {
        let registry = ToolRegistry::new();
        let def = registry.find("feishu.v1.bitable.search").unwrap();
        assert!(def.validate_params(&json!({"app_token": "a", "table_id": "t"})).is_ok());
    }

    #[test]
    fn search_person_requires_field_and_open_id() {
        let registry = ToolRegistry::new();
        let def = registry.find("feishu.v1.bitable.search_person").unwrap();
        let err = def.validate_params(&json!({"app_token": "a", "table_id": "t"})).unwrap_err();
        assert!(err.contains("field") || err.contains("open_id"));
        assert!(def.validate_params(&json!({"app_token": "a", "table_id": "t", "field": "主办律师", "open_id": "ou_A"})).is_ok());
    }

    #[test]
    fn search_date_range_requires_numeric_bounds() {
        let registry = ToolRegistry::new();
        let def = registry.find("feishu.v1.bitable.search_date_range").unwrap();
        assert!(def
            .validate_params(&json!({"app_token": "a", "table_id": "t", "field": "开庭日", "from_ms": 0, "to_ms": 1}))
            .is_ok());
    }

    #[test]
    fn new_registry_starts_with_zeroed_counters() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.invocations.load(Ordering::Relaxed), 0);
        assert_eq!(registry.failures.load(Ordering::Relaxed), 0);
    }
}
