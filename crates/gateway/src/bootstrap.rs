//! Subsystem construction and the periodic background tasks kept running
//! for the lifetime of the process. Mirrors the teacher's `bootstrap.rs`
//! split from `main.rs`: build everything here with a tracing checkpoint
//! after each subsystem, then hand the assembled [`AppState`] back.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cw_automation::{CheckpointStore, DelayRunner, DelayStore, ExecutorConfig, IdempotencyStore, RuleRegistry, RunLogStore, SchemaCacheStore, SchemaWatcher, SchemaWatcherConfig, SnapshotStore};
use cw_domain::schema::{FieldKind, FieldSchema, TableSchema};
use chrono::Utc;
use serde_json::json;
use cw_bitable::{BitableClient, TokenCache};
use cw_domain::config::Config;
use cw_llm::{LlmRouter, OpenAiCompatProvider};
use cw_orchestrator::{CreateSkill, IntentParser, Orchestrator, ReminderStore, TableAlias, TableCatalog, UpdateSkill};
use cw_sessions::{ConversationStore, DedupeStore, LifecycleManager};

use crate::api::mcp::ToolRegistry;
use crate::state::AppState;

pub async fn build_app_state(config: Config) -> Result<AppState> {
    let config = Arc::new(config);
    let state_dir = Path::new(&config.server.state_dir);
    std::fs::create_dir_all(state_dir).context("creating state directory")?;

    let http = Arc::new(reqwest::Client::new());

    let tokens = Arc::new(TokenCache::new(
        config.channel.app_id.clone().unwrap_or_default(),
        config.channel.app_secret.clone().unwrap_or_default(),
        config.bitable.domain.clone().unwrap_or_else(|| "https://open.feishu.cn/open-apis".to_string()),
    ));
    let bitable = Arc::new(BitableClient::new(
        config.bitable.domain.clone().unwrap_or_else(|| "https://open.feishu.cn/open-apis".to_string()),
        tokens,
        config.llm.timeout_seconds,
    )?);
    tracing::info!("bitable client ready");

    let task_provider = match &config.llm.task_base_url {
        Some(base) => Some(Arc::new(OpenAiCompatProvider::new(
            "task",
            base.clone(),
            config.llm.task_api_key.clone().unwrap_or_default(),
            config.llm.task_model.clone().unwrap_or_default(),
            config.llm.timeout_seconds,
        )?) as Arc<dyn cw_llm::LlmProvider>),
        None => None,
    };
    let chat_provider = match &config.llm.chat_base_url {
        Some(base) => Some(Arc::new(OpenAiCompatProvider::new(
            "chat",
            base.clone(),
            config.llm.chat_api_key.clone().unwrap_or_default(),
            config.llm.chat_model.clone().unwrap_or_default(),
            config.llm.timeout_seconds,
        )?) as Arc<dyn cw_llm::LlmProvider>),
        None => None,
    };
    let llm = Arc::new(LlmRouter::new(task_provider, chat_provider, Duration::from_secs(config.llm.timeout_seconds)));
    tracing::info!(
        task_configured = config.llm.task_base_url.is_some(),
        chat_configured = config.llm.chat_base_url.is_some(),
        "llm router ready"
    );

    let sessions = Arc::new(ConversationStore::new(state_dir)?);
    let channel_dedupe = Arc::new(DedupeStore::new(Duration::from_secs(600)));
    let reminders = Arc::new(ReminderStore::new(state_dir));
    tracing::info!("conversation store and reminder store ready");

    let aliases = match (&config.bitable.default_app_token, &config.bitable.default_table_id) {
        (Some(app_token), Some(table_id)) => {
            vec![TableAlias { keywords: vec![], app_token: app_token.clone(), table_id: table_id.clone(), label: "default".to_string() }]
        }
        _ => vec![],
    };
    let tables = Arc::new(TableCatalog::new(aliases, config.orchestrator.table_confidence_threshold));

    let intent = IntentParser::new(config.orchestrator.direct_execute_threshold, config.orchestrator.llm_confirm_threshold, config.orchestrator.max_hops);
    let orchestrator = Arc::new(Orchestrator::new(intent, config.orchestrator.max_hops, CreateSkill::new(vec![], vec![]), UpdateSkill::new(vec![])));
    tracing::info!("conversation orchestrator ready");

    let rules = Arc::new(if Path::new(&config.server.rules_path).exists() {
        RuleRegistry::load(&config.server.rules_path)?
    } else {
        tracing::warn!(path = %config.server.rules_path, "rules file not found, starting with an empty registry");
        let path = state_dir.join("rules.empty.yaml");
        std::fs::write(&path, "rules: []\n")?;
        RuleRegistry::load(&path)?
    });
    let snapshots = Arc::new(SnapshotStore::new(state_dir));
    let idempotency = Arc::new(IdempotencyStore::new(state_dir, 24 * 3600));
    let schema_cache = Arc::new(SchemaCacheStore::new(state_dir));
    let checkpoints = Arc::new(CheckpointStore::new(state_dir));
    let delay_store = Arc::new(DelayStore::new(state_dir));
    let run_log = Arc::new(RunLogStore::new(state_dir));
    tracing::info!(rules = rules.all().len(), "automation engine ready");

    let tools = Arc::new(ToolRegistry::new());
    tracing::info!(tools = tools.definitions().len(), "mcp tool registry ready");

    Ok(AppState {
        config,
        orchestrator,
        sessions,
        channel_dedupe,
        reminders,
        tables,
        bitable,
        llm,
        http,
        rules,
        snapshots,
        idempotency,
        schema_cache,
        checkpoints,
        delay_store,
        run_log,
        tools,
    })
}

fn executor_config(state: &AppState) -> ExecutorConfig {
    ExecutorConfig {
        max_retries: state.config.automation.action_max_retries,
        retry_delay: Duration::from_secs(state.config.automation.action_retry_delay_seconds),
        retry_delay_max: Duration::from_secs(state.config.automation.action_retry_delay_seconds * 8),
        http_allowed_domains: state.config.automation.http_allowed_domains.clone(),
        http_timeout: Duration::from_secs(state.config.automation.http_timeout_seconds),
    }
}

/// Spawns the long-running sweeps the server keeps alive for its whole
/// lifetime: conversation idle eviction, the delay-task poller, and (when
/// enabled) the periodic schema-sync tick.
pub fn spawn_background_tasks(state: AppState) {
    let idle = state.clone();
    tokio::spawn(async move {
        let lifecycle = LifecycleManager::new(idle.config.orchestrator.idle_ttl_minutes);
        lifecycle.run_forever(&idle.sessions, Duration::from_secs(60)).await;
    });

    if state.config.reminders.scheduler_enabled {
        let delay = state.clone();
        tokio::spawn(async move {
            let cfg = executor_config(&delay);
            let runner = DelayRunner { delay_store: &delay.delay_store, bitable: &delay.bitable, http: &delay.http, executor_config: &cfg };
            runner.run_forever(Duration::from_secs(30)).await;
        });
    }

    if state.config.automation.schema_sync_enabled {
        let schema = state.clone();
        let interval = Duration::from_secs(schema.config.automation.schema_sync_interval_seconds);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                sync_all_table_schemas(&schema).await;
            }
        });
    }

    tracing::info!("background tasks spawned");
}

/// Samples every table the rule registry references and refreshes its
/// cached schema, letting the watcher runtime-disable rules whose
/// trigger field has disappeared.
async fn sync_all_table_schemas(state: &AppState) {
    let watcher_cfg = SchemaWatcherConfig { risk_webhook_url: state.config.automation.schema_webhook_url.clone(), risk_webhook_secret: state.config.automation.schema_webhook_secret.clone() };
    let watcher = SchemaWatcher { cache: &state.schema_cache, rules: &state.rules, http: &state.http, config: &watcher_cfg };
    let default_app_token = state.config.bitable.default_app_token.clone().unwrap_or_default();

    let mut table_ids: Vec<String> = state.rules.all().into_iter().map(|r| r.table.table_id).collect();
    table_ids.sort();
    table_ids.dedup();

    for table_id in table_ids {
        let sample = match state.bitable.search_with_filter(&default_app_token, &table_id, json!({})).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(table_id, error = %e, "schema sync sample fetch failed");
                continue;
            }
        };
        let mut field_names: Vec<String> = Vec::new();
        for record in sample.iter().take(20) {
            for name in record.fields.keys() {
                if !field_names.contains(name) {
                    field_names.push(name.clone());
                }
            }
        }
        let fresh = TableSchema { table_id: table_id.clone(), fields: field_names.into_iter().map(|name| FieldSchema { name, kind: FieldKind::Unknown }).collect(), refreshed_at: Utc::now() };
        watcher.refresh(fresh).await;
    }
}
