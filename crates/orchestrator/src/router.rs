//! Orchestrates one inbound message: L0 short-circuit, intent parsing,
//! skill-chain execution, response rendering.
//!
//! Structured the way the teacher structures turn execution — a single
//! context threaded through ordered stages, each stage able to
//! short-circuit the rest.

use std::collections::VecDeque;

use crate::intent::IntentParser;
use crate::l0::{L0Outcome, L0Rules};
use crate::renderer::{RenderedResponse, ResponseRenderer};
use crate::result::{SkillKind, SkillResult};
use crate::skills::chitchat::ChitchatSkill;
use crate::skills::mutate::{CreateSkill, DeleteSkill, UpdateSkill};
use crate::skills::query::QuerySkill;
use crate::skills::reminder_skill::ReminderSkill;
use crate::skills::summary::SummarySkill;
use crate::skills::SkillContext;

pub struct Orchestrator {
    l0: L0Rules,
    intent: IntentParser,
    max_hops: u32,
    query: QuerySkill,
    create: CreateSkill,
    update: UpdateSkill,
    delete: DeleteSkill,
    summary: SummarySkill,
    reminder: ReminderSkill,
    chitchat: ChitchatSkill,
    renderer: ResponseRenderer,
}

impl Orchestrator {
    pub fn new(intent: IntentParser, max_hops: u32, create: CreateSkill, update: UpdateSkill) -> Self {
        Self {
            l0: L0Rules::new(),
            intent,
            max_hops,
            query: QuerySkill::new(),
            create,
            update,
            delete: DeleteSkill::new(),
            summary: SummarySkill::new(),
            reminder: ReminderSkill::new(),
            chitchat: ChitchatSkill::new(),
            renderer: ResponseRenderer::new(),
        }
    }

    async fn dispatch_one(&self, skill: SkillKind, ctx: &SkillContext<'_>) -> SkillResult {
        match skill {
            SkillKind::Query => self.query.run(ctx).await,
            SkillKind::Create => self.create.run(ctx).await,
            SkillKind::Update => self.update.run(ctx).await,
            SkillKind::Delete => self.delete.run(ctx).await,
            SkillKind::Summary => self.summary.run(ctx).await,
            SkillKind::Reminder => self.reminder.run(ctx).await,
            SkillKind::Chitchat => self.chitchat.run(ctx).await,
        }
    }

    async fn run_chain(&self, chain: Vec<SkillKind>, base_ctx: &SkillContext<'_>) -> Vec<SkillResult> {
        let mut results = Vec::new();
        let mut queue: VecDeque<SkillKind> = chain.into_iter().collect();
        let mut hops = 0u32;
        let mut carry = base_ctx.carry.clone();

        while let Some(skill) = queue.pop_front() {
            if hops >= self.max_hops {
                tracing::warn!(max_hops = self.max_hops, "skill chain truncated at hop limit");
                break;
            }
            hops += 1;
            let ctx = base_ctx.with_carry(carry.take());
            let result = self.dispatch_one(skill, &ctx).await;
            carry = result.data.clone();
            let stop = !result.ok;
            let next = result.next_skill;
            results.push(result);
            if stop {
                break;
            }
            if let Some(next_skill) = next {
                queue.push_front(next_skill);
            }
        }
        results
    }

    /// Runs the full pipeline for one inbound message and renders the
    /// reply. `ctx.state` must be the conversation snapshot taken at the
    /// top of this turn.
    pub async fn handle_message(&self, ctx: SkillContext<'_>) -> RenderedResponse {
        let had_pending = ctx.state.pending_action.clone();

        if let Some(outcome) = self.l0.evaluate(&ctx.text, &ctx.state, &ctx.default_app_token, ctx.now) {
            return match outcome {
                L0Outcome::Refused { message, code } => {
                    tracing::info!(code, "l0 refused message before any skill ran");
                    self.renderer.render(&[SkillResult::refused(message)], false)
                }
                L0Outcome::PendingDiscarded { notice } => {
                    ctx.sessions.clear_pending_action(&ctx.open_id);
                    self.renderer.render(&[SkillResult::ok(notice)], false)
                }
                L0Outcome::CannedPrompt { message } => self.renderer.render(&[SkillResult::ok(message)], false),
                L0Outcome::Page { message, new_offset } => {
                    ctx.sessions.update(&ctx.open_id, move |s| {
                        s.slot_memory.insert(crate::l0::PAGE_OFFSET_KEY.to_string(), serde_json::json!(new_offset));
                    });
                    self.renderer.render(&[SkillResult::ok(message)], false)
                }
                L0Outcome::Dispatch { chain } => {
                    let results = self.run_chain(chain, &ctx).await;
                    self.renderer.render(&results, false)
                }
                L0Outcome::Referent { chain, active_record } => {
                    let mut ctx = ctx;
                    ctx.state.active_record = Some(active_record.clone());
                    ctx.sessions.update(&ctx.open_id, move |s| {
                        s.active_record = Some(active_record.clone());
                    });
                    let results = self.run_chain(chain, &ctx).await;
                    self.renderer.render(&results, false)
                }
            };
        }

        let intent = self.intent.parse(&ctx.text, ctx.llm).await;
        tracing::debug!(confidence = intent.confidence, via = ?intent.via, chain = ?intent.chain, "intent parsed");
        let results = self.run_chain(intent.chain, &ctx).await;

        let superseded = had_pending.is_some()
            && ctx
                .sessions
                .get(&ctx.open_id)
                .and_then(|s| s.pending_action)
                .map(|new_pending| Some(new_pending.kind) != had_pending.as_ref().map(|p| p.kind))
                .unwrap_or(false);

        self.renderer.render(&results, superseded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminder::ReminderStore;
    use crate::tables::{TableAlias, TableCatalog};
    use async_trait::async_trait;
    use cw_bitable::{BitableClient, TokenCache};
    use cw_domain::config::OrchestratorConfig;
    use cw_domain::error::Result;
    use cw_llm::{ChatRequest, ChatResponse, LlmProvider, LlmRouter};
    use cw_sessions::ConversationStore;
    use std::sync::Arc;

    struct StubProvider;

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse { content: "{}".to_string(), model: "stub".into() })
        }
        fn provider_id(&self) -> &str {
            "stub"
        }
    }

    fn orchestrator() -> Orchestrator {
        let intent = IntentParser::new(0.75, 0.4, 2);
        Orchestrator::new(intent, 2, CreateSkill::new(vec![], vec![]), UpdateSkill::new(vec![]))
    }

    async fn base_ctx(dir: &std::path::Path, text: &str) -> SkillContext<'static> {
        // Leak the owned collaborators for the duration of the test process;
        // acceptable for a short-lived unit test fixture.
        let tokens = Arc::new(TokenCache::new("app_id", "app_secret", "http://localhost:0"));
        let bitable: &'static BitableClient = Box::leak(Box::new(BitableClient::new("http://localhost:0", tokens, 5).unwrap()));
        let sessions: &'static ConversationStore = Box::leak(Box::new(ConversationStore::new(dir).unwrap()));
        let llm: &'static LlmRouter =
            Box::leak(Box::new(LlmRouter::new(Some(Arc::new(StubProvider)), Some(Arc::new(StubProvider)), std::time::Duration::from_secs(1))));
        let reminders: &'static ReminderStore = Box::leak(Box::new(ReminderStore::new(dir)));
        let tables: &'static TableCatalog = Box::leak(Box::new(TableCatalog::new(
            vec![TableAlias { keywords: vec!["案件".into()], app_token: "app1".into(), table_id: "tbl1".into(), label: "cases".into() }],
            0.65,
        )));
        let config: &'static OrchestratorConfig = Box::leak(Box::new(OrchestratorConfig::default()));

        let (state, _) = sessions.resolve_or_create("ou_A");
        SkillContext {
            open_id: "ou_A".to_string(),
            text: text.to_string(),
            now: chrono::Utc::now(),
            bitable,
            sessions,
            llm,
            reminders,
            tables,
            config,
            default_app_token: "app1".to_string(),
            state,
            carry: None,
        }
    }

    #[tokio::test]
    async fn bulk_delete_is_refused_before_any_skill_runs() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = base_ctx(dir.path(), "删掉所有案件").await;
        let response = orchestrator().handle_message(ctx).await;
        assert!(!response.meta.ok);
        assert!(response.text_fallback.contains("禁用"));
    }

    #[tokio::test]
    async fn chitchat_greeting_renders_a_friendly_reply() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = base_ctx(dir.path(), "你好").await;
        let response = orchestrator().handle_message(ctx).await;
        assert!(response.meta.ok);
        assert_eq!(response.meta.skills_run, 1);
    }

    #[tokio::test]
    async fn fallthrough_message_runs_chitchat() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = base_ctx(dir.path(), "今天天气不错").await;
        let response = orchestrator().handle_message(ctx).await;
        assert!(response.meta.ok);
    }

    #[tokio::test]
    async fn empty_message_is_a_canned_prompt_not_chitchat() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = base_ctx(dir.path(), "   ").await;
        let response = orchestrator().handle_message(ctx).await;
        assert!(response.meta.ok);
        assert!(response.text_fallback.contains("没有收到内容"));
    }

    #[tokio::test]
    async fn next_page_without_a_prior_query_prompts_to_search_first() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = base_ctx(dir.path(), "下一页").await;
        let response = orchestrator().handle_message(ctx).await;
        assert!(response.meta.ok);
        assert!(response.text_fallback.contains("请先查询"));
    }

    #[tokio::test]
    async fn referent_token_seeds_active_record_before_dispatching() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = base_ctx(dir.path(), "删除第2个").await;
        let sessions = ctx.sessions;
        let open_id = ctx.open_id.clone();
        sessions.update(&open_id, |s| {
            s.active_table = Some("tbl1".to_string());
            s.last_result_ids = vec!["rec1".into(), "rec2".into()];
        });
        let ctx = base_ctx_with_state(dir.path(), "删除第2个", sessions).await;
        orchestrator().handle_message(ctx).await;
        let state = sessions.get(&open_id).unwrap();
        assert_eq!(state.active_record.unwrap().record_id, "rec2");
        // A confirmation prompt is now pending rather than an immediate delete.
        assert!(state.pending_action.is_some());
    }

    async fn base_ctx_with_state(dir: &std::path::Path, text: &str, sessions: &'static ConversationStore) -> SkillContext<'static> {
        let tokens = Arc::new(TokenCache::new("app_id", "app_secret", "http://localhost:0"));
        let bitable: &'static BitableClient = Box::leak(Box::new(BitableClient::new("http://localhost:0", tokens, 5).unwrap()));
        let llm: &'static LlmRouter =
            Box::leak(Box::new(LlmRouter::new(Some(Arc::new(StubProvider)), Some(Arc::new(StubProvider)), std::time::Duration::from_secs(1))));
        let reminders: &'static ReminderStore = Box::leak(Box::new(ReminderStore::new(dir)));
        let tables: &'static TableCatalog = Box::leak(Box::new(TableCatalog::new(
            vec![TableAlias { keywords: vec!["案件".into()], app_token: "app1".into(), table_id: "tbl1".into(), label: "cases".into() }],
            0.65,
        )));
        let config: &'static OrchestratorConfig = Box::leak(Box::new(OrchestratorConfig::default()));

        let (state, _) = sessions.resolve_or_create("ou_A");
        SkillContext {
            open_id: "ou_A".to_string(),
            text: text.to_string(),
            now: chrono::Utc::now(),
            bitable,
            sessions,
            llm,
            reminders,
            tables,
            config,
            default_app_token: "app1".to_string(),
            state,
            carry: None,
        }
    }
}
