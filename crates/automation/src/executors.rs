//! Action Executors — one async function per pipeline action kind, each
//! reporting `{ok, error, retry_count, duration_ms}`. Wrapped in the
//! retry+dead-letter logic by the Processor.

use std::time::{Duration, Instant};

use cw_bitable::BitableClient;
use cw_domain::record::Fields;
use cw_domain::rule::{Action, TableRef};

use crate::retry::{classify_status, with_retry, FailureClass};
use crate::ssrf_guard::check_allowed;
use crate::store::delay::DelayStore;
use crate::template::{render_map, render_template};

pub struct ExecutorConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub retry_delay_max: Duration,
    pub http_allowed_domains: Vec<String>,
    pub http_timeout: Duration,
}

pub struct ActionOutcome {
    pub ok: bool,
    pub error: Option<String>,
    pub retry_count: u32,
    pub duration_ms: u64,
    /// Rendered template text, populated by `log.write`.
    pub rendered: Option<String>,
}

impl ActionOutcome {
    fn ok(started: Instant, retry_count: u32, rendered: Option<String>) -> Self {
        Self {
            ok: true,
            error: None,
            retry_count,
            duration_ms: started.elapsed().as_millis() as u64,
            rendered,
        }
    }

    fn err(started: Instant, retry_count: u32, message: String) -> Self {
        Self {
            ok: false,
            error: Some(message),
            retry_count,
            duration_ms: started.elapsed().as_millis() as u64,
            rendered: None,
        }
    }
}

fn resolve_app_token(target: &TableRef, default_app_token: &str) -> String {
    target.app_token.clone().unwrap_or_else(|| default_app_token.to_string())
}

pub async fn execute(
    action: &Action,
    default_app_token: &str,
    record_id: &str,
    current_fields: &Fields,
    bitable: &BitableClient,
    http: &reqwest::Client,
    delay_store: &DelayStore,
    rule_id: &str,
    cfg: &ExecutorConfig,
) -> ActionOutcome {
    let started = Instant::now();
    match action {
        Action::LogWrite { template } => {
            let rendered = render_template(template, current_fields);
            ActionOutcome::ok(started, 0, Some(rendered))
        }

        Action::BitableUpdate { target, fields } => {
            let app_token = resolve_app_token(target, default_app_token);
            let rendered = render_map(fields, current_fields);
            let locator = cw_domain::record::Locator::new(app_token, target.table_id.clone(), record_id.to_string());
            let (result, retries) = with_retry(
                cfg.max_retries,
                cfg.retry_delay,
                cfg.retry_delay_max,
                classify_error,
                || {
                    let locator = locator.clone();
                    let rendered = rendered.clone();
                    async move { bitable.update_record(&locator, &rendered).await }
                },
            )
            .await;
            match result {
                Ok(_) => ActionOutcome::ok(started, retries, None),
                Err(e) => ActionOutcome::err(started, retries, e.to_string()),
            }
        }

        Action::BitableUpsert { target, anchor_field, fields } => {
            let app_token = resolve_app_token(target, default_app_token);
            let rendered = render_map(fields, current_fields);
            let anchor_value = rendered.get(anchor_field).map(|v| v.render()).unwrap_or_default();
            let (result, retries) = with_retry(
                cfg.max_retries,
                cfg.retry_delay,
                cfg.retry_delay_max,
                classify_error,
                || {
                    let app_token = app_token.clone();
                    let table_id = target.table_id.clone();
                    let anchor_field = anchor_field.clone();
                    let anchor_value = anchor_value.clone();
                    let rendered = rendered.clone();
                    async move {
                        let existing = bitable.search_exact(&app_token, &table_id, &anchor_field, &anchor_value).await?;
                        match existing.into_iter().next() {
                            Some(found) => bitable.update_record(&found.locator, &rendered).await,
                            None => bitable.create_record(&app_token, &table_id, &rendered).await,
                        }
                    }
                },
            )
            .await;
            match result {
                Ok(_) => ActionOutcome::ok(started, retries, None),
                Err(e) => ActionOutcome::err(started, retries, e.to_string()),
            }
        }

        Action::CalendarCreate { title, start_field, end_field } => {
            let rendered_title = render_template(title, current_fields);
            let start_ms = current_fields.get(start_field).and_then(as_epoch_ms);
            let end_ms = current_fields.get(end_field).and_then(as_epoch_ms);
            let (Some(start_ms), Some(end_ms)) = (start_ms, end_ms) else {
                // Skipped cleanly when date fields are empty.
                return ActionOutcome::ok(started, 0, None);
            };
            let (result, retries) = with_retry(
                cfg.max_retries,
                cfg.retry_delay,
                cfg.retry_delay_max,
                classify_error,
                || {
                    let rendered_title = rendered_title.clone();
                    async move { bitable.create_calendar_event(&rendered_title, start_ms, end_ms).await }
                },
            )
            .await;
            match result {
                Ok(_) => ActionOutcome::ok(started, retries, None),
                Err(e) => ActionOutcome::err(started, retries, e.to_string()),
            }
        }

        Action::HttpRequest { method, url, headers, body } => {
            let rendered_body = body.clone();
            let parsed = match reqwest::Url::parse(url) {
                Ok(u) => u,
                Err(e) => return ActionOutcome::err(started, 0, format!("invalid url: {e}")),
            };
            if let Err(rejection) = check_allowed(&parsed, &cfg.http_allowed_domains) {
                return ActionOutcome::err(started, 0, format!("{rejection:?}"));
            }
            let (result, retries) = with_retry(
                cfg.max_retries,
                cfg.retry_delay,
                cfg.retry_delay_max,
                |e: &String| classify_status(e.parse().unwrap_or(0)),
                || {
                    let method = method.clone();
                    let parsed = parsed.clone();
                    let headers = headers.clone();
                    let rendered_body = rendered_body.clone();
                    async move { send_http(http, cfg.http_timeout, &method, parsed, &headers, rendered_body.as_ref()).await }
                },
            )
            .await;
            match result {
                // Response body is deliberately not logged; only status is surfaced.
                Ok(status) => ActionOutcome::ok(started, retries, Some(format!("http {status}"))),
                Err(status_or_err) => ActionOutcome::err(started, retries, status_or_err),
            }
        }

        Action::Delay { seconds, pipeline } => {
            let scheduled_at = chrono::Utc::now() + chrono::Duration::seconds(*seconds as i64);
            let task = cw_domain::delay::DelayTask::new(
                rule_id.to_string(),
                scheduled_at,
                serde_json::to_value(current_fields).unwrap_or_default(),
                pipeline.clone(),
            );
            delay_store.insert(task).await;
            ActionOutcome::ok(started, 0, None)
        }
    }
}

fn as_epoch_ms(value: &cw_domain::record::Value) -> Option<i64> {
    match value {
        cw_domain::record::Value::Date(ms) => Some(*ms),
        _ => None,
    }
}

fn classify_error(e: &cw_domain::error::Error) -> FailureClass {
    use cw_domain::error::ErrorCode;
    match e.code() {
        ErrorCode::Mcp002 | ErrorCode::Mcp003 => FailureClass::Permanent,
        _ => FailureClass::Transient,
    }
}

/// Returns the HTTP status code on success (2xx), or a status-shaped
/// error string the retry classifier can parse back into a status.
async fn send_http(
    client: &reqwest::Client,
    timeout: Duration,
    method: &str,
    url: reqwest::Url,
    headers: &std::collections::BTreeMap<String, String>,
    body: Option<&serde_json::Value>,
) -> Result<u16, String> {
    let method = reqwest::Method::from_bytes(method.as_bytes()).unwrap_or(reqwest::Method::POST);
    let mut builder = client.request(method, url).timeout(timeout.min(Duration::from_secs(10)));
    for (k, v) in headers {
        builder = builder.header(k, v);
    }
    if let Some(b) = body {
        builder = builder.json(b);
    }
    match builder.send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if resp.status().is_success() {
                Ok(status)
            } else {
                Err(status.to_string())
            }
        }
        Err(_) => Err("0".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_domain::record::Value;

    #[test]
    fn log_write_renders_template_without_touching_network() {
        let fields: Fields = [("status".to_string(), Value::Text("done".into()))].into_iter().collect();
        let rendered = render_template("now {status}", &fields);
        assert_eq!(rendered, "now done");
    }

    #[test]
    fn as_epoch_ms_only_matches_date_values() {
        assert_eq!(as_epoch_ms(&Value::Date(123)), Some(123));
        assert_eq!(as_epoch_ms(&Value::Text("x".into())), None);
    }

    #[tokio::test]
    async fn calendar_create_skips_cleanly_with_missing_date_fields() {
        let dir = tempfile::tempdir().unwrap();
        let delay_store = DelayStore::new(dir.path());
        let tokens = std::sync::Arc::new(cw_bitable::TokenCache::new("id", "secret", "http://127.0.0.1:0"));
        let bitable = BitableClient::new("http://127.0.0.1:0", tokens, 1).unwrap();
        let http = reqwest::Client::new();
        let cfg = ExecutorConfig {
            max_retries: 1,
            retry_delay: Duration::from_millis(1),
            retry_delay_max: Duration::from_millis(5),
            http_allowed_domains: vec![],
            http_timeout: Duration::from_secs(1),
        };
        let action = Action::CalendarCreate {
            title: "x".into(),
            start_field: "start".into(),
            end_field: "end".into(),
        };
        let outcome = execute(&action, "app1", "rec1", &Fields::new(), &bitable, &http, &delay_store, "R001", &cfg).await;
        assert!(outcome.ok);
    }

    #[tokio::test]
    async fn http_request_rejects_disallowed_host_without_network_call() {
        let dir = tempfile::tempdir().unwrap();
        let delay_store = DelayStore::new(dir.path());
        let tokens = std::sync::Arc::new(cw_bitable::TokenCache::new("id", "secret", "http://127.0.0.1:0"));
        let bitable = BitableClient::new("http://127.0.0.1:0", tokens, 1).unwrap();
        let http = reqwest::Client::new();
        let cfg = ExecutorConfig {
            max_retries: 1,
            retry_delay: Duration::from_millis(1),
            retry_delay_max: Duration::from_millis(5),
            http_allowed_domains: vec!["example.com".into()],
            http_timeout: Duration::from_secs(1),
        };
        let action = Action::HttpRequest {
            method: "POST".into(),
            url: "http://localhost/hook".into(),
            headers: Default::default(),
            body: None,
        };
        let outcome = execute(&action, "app1", "rec1", &Fields::new(), &bitable, &http, &delay_store, "R001", &cfg).await;
        assert!(!outcome.ok);
    }

    #[tokio::test]
    async fn delay_action_enqueues_task_without_running_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let delay_store = DelayStore::new(dir.path());
        let tokens = std::sync::Arc::new(cw_bitable::TokenCache::new("id", "secret", "http://127.0.0.1:0"));
        let bitable = BitableClient::new("http://127.0.0.1:0", tokens, 1).unwrap();
        let http = reqwest::Client::new();
        let cfg = ExecutorConfig {
            max_retries: 1,
            retry_delay: Duration::from_millis(1),
            retry_delay_max: Duration::from_millis(5),
            http_allowed_domains: vec![],
            http_timeout: Duration::from_secs(1),
        };
        let action = Action::Delay { seconds: 60, pipeline: vec![] };
        let outcome = execute(&action, "app1", "rec1", &Fields::new(), &bitable, &http, &delay_store, "R001", &cfg).await;
        assert!(outcome.ok);
        assert_eq!(delay_store.list().await.len(), 1);
    }
}
