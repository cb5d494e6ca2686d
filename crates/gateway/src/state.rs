//! Process-wide shared state, assembled once in [`crate::bootstrap`] and
//! cloned cheaply (every field is an `Arc`) into each request handler.

use std::sync::Arc;

use cw_automation::{CheckpointStore, DelayStore, IdempotencyStore, RuleRegistry, RunLogStore, SchemaCacheStore, SnapshotStore};
use cw_bitable::BitableClient;
use cw_domain::config::Config;
use cw_llm::LlmRouter;
use cw_orchestrator::{Orchestrator, ReminderStore, TableCatalog};
use cw_sessions::{ConversationStore, DedupeStore};

/// Every long-lived collaborator the HTTP surface needs. Cloning an
/// `AppState` is O(1) — it's a bag of `Arc`s, matching the shape every
/// axum handler expects via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Conversation orchestrator ──
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<ConversationStore>,
    pub channel_dedupe: Arc<DedupeStore>,
    pub reminders: Arc<ReminderStore>,
    pub tables: Arc<TableCatalog>,

    // ── Shared backend + model access ──
    pub bitable: Arc<BitableClient>,
    pub llm: Arc<LlmRouter>,
    pub http: Arc<reqwest::Client>,

    // ── Automation engine ──
    pub rules: Arc<RuleRegistry>,
    pub snapshots: Arc<SnapshotStore>,
    pub idempotency: Arc<IdempotencyStore>,
    pub schema_cache: Arc<SchemaCacheStore>,
    pub checkpoints: Arc<CheckpointStore>,
    pub delay_store: Arc<DelayStore>,
    pub run_log: Arc<RunLogStore>,

    // ── MCP tool surface ──
    pub tools: Arc<crate::api::mcp::ToolRegistry>,
}
