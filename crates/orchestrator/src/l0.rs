//! Deterministic pre-LLM short-circuits, checked before intent parsing.
//!
//! Four concerns live here, same priority order the router checks them
//! in: a pending action is ambient conversational state that must
//! resolve (or expire) before anything else runs; empty input never
//! reaches the LLM; bulk-destructive phrasing is refused outright with
//! no tool call and no LLM round trip; and pagination/referent tokens
//! are resolved against the last query's remembered result ids without
//! a classification pass.

use chrono::{DateTime, Utc};
use cw_domain::conversation::{ConversationState, PendingActionKind};
use cw_domain::record::Locator;

use crate::result::SkillKind;

const BULK_DELETE_PHRASES: &[&str] =
    &["删除所有", "删掉所有", "全部删除", "清空", "delete all", "delete everything"];

const CONFIRM_WORDS: &[&str] = &["确认", "是", "对", "yes", "confirm"];
const CANCEL_WORDS: &[&str] = &["取消", "算了", "no", "cancel"];
const NEXT_PAGE_WORDS: &[&str] = &["下一页", "下页", "next page"];
const REFERENT_DEMONSTRATIVES: &[&str] = &["这个", "这条", "那个", "那条"];
const DELETE_VERBS: &[&str] = &["删除", "删掉", "delete", "remove"];
const UPDATE_VERBS: &[&str] = &["修改", "更新", "改一下", "update"];

/// Results are shown 20 at a time, matching `query::render_record_list`'s cap.
const RESULT_PAGE_SIZE: usize = 20;

/// Slot-memory key holding the next unshown index into `last_result_ids`.
pub(crate) const PAGE_OFFSET_KEY: &str = "page_offset";

#[derive(Debug, Clone, PartialEq)]
pub enum L0Outcome {
    /// Skip intent parsing entirely and run this fixed chain.
    Dispatch { chain: Vec<SkillKind> },
    /// A pending action expired or was explicitly cancelled; nothing runs.
    PendingDiscarded { notice: String },
    /// A deterministic refusal, e.g. bulk delete.
    Refused { message: String, code: &'static str },
    /// Empty/whitespace input; nothing runs, no state changes.
    CannedPrompt { message: String },
    /// A pagination token was resolved against `last_result_ids`. The
    /// router persists `new_offset` to slot memory before rendering.
    Page { message: String, new_offset: usize },
    /// A referent token resolved to a single remembered record. The
    /// router seeds `active_record` before running `chain`.
    Referent { chain: Vec<SkillKind>, active_record: Locator },
}

pub struct L0Rules;

impl L0Rules {
    pub fn new() -> Self {
        Self
    }

    /// `text` is the raw inbound message; `state` is the conversation
    /// snapshot taken at the top of the turn; `default_app_token` seeds
    /// any `Locator` resolved from a referent token.
    pub fn evaluate(
        &self,
        text: &str,
        state: &ConversationState,
        default_app_token: &str,
        now: DateTime<Utc>,
    ) -> Option<L0Outcome> {
        let pending = state.pending_action.as_ref();

        if let Some(action) = pending {
            if action.is_expired(now) {
                return Some(L0Outcome::PendingDiscarded {
                    notice: "之前的操作已超时，已自动取消。".to_string(),
                });
            }
        }

        if text.trim().is_empty() {
            return Some(L0Outcome::CannedPrompt {
                message: "没有收到内容，请告诉我需要查询、创建、更新还是删除记录。".to_string(),
            });
        }

        if let Some(action) = pending {
            let lower = text.trim();
            if action.kind == PendingActionKind::ConfirmDelete || action.kind == PendingActionKind::ConfirmUpdate {
                if CANCEL_WORDS.iter().any(|w| lower.eq_ignore_ascii_case(w)) {
                    return Some(L0Outcome::PendingDiscarded { notice: "已取消。".to_string() });
                }
                if CONFIRM_WORDS.iter().any(|w| lower.eq_ignore_ascii_case(w)) {
                    return Some(L0Outcome::Dispatch { chain: vec![pending_skill(action.kind)] });
                }
                // Anything else leaves the pending action in place for a
                // later turn rather than silently dropping it.
                return None;
            }
            // complete_fields: any reply (already known non-empty above)
            // is treated as the missing slot value and routed straight to
            // the owning skill.
            return Some(L0Outcome::Dispatch { chain: vec![pending_skill(action.kind)] });
        }

        if BULK_DELETE_PHRASES.iter().any(|p| text.contains(p)) {
            return Some(L0Outcome::Refused {
                message: "批量删除已被禁用，请逐条指定要删除的记录。".to_string(),
                code: "delete_disabled",
            });
        }

        if NEXT_PAGE_WORDS.iter().any(|w| text.contains(w)) {
            return Some(paginate(state));
        }

        if let Some(outcome) = resolve_referent(text, state, default_app_token) {
            return Some(outcome);
        }

        None
    }
}

impl Default for L0Rules {
    fn default() -> Self {
        Self::new()
    }
}

fn pending_skill(kind: PendingActionKind) -> SkillKind {
    match kind {
        PendingActionKind::ConfirmDelete => SkillKind::Delete,
        PendingActionKind::ConfirmUpdate => SkillKind::Update,
        PendingActionKind::CompleteFields => SkillKind::Create,
    }
}

fn paginate(state: &ConversationState) -> L0Outcome {
    if state.last_result_ids.is_empty() {
        return L0Outcome::CannedPrompt { message: "没有可翻页的查询结果，请先查询一次。".to_string() };
    }

    let offset = state
        .slot_memory
        .get(PAGE_OFFSET_KEY)
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(RESULT_PAGE_SIZE);

    if offset >= state.last_result_ids.len() {
        return L0Outcome::Page { message: "已是最后一页了。".to_string(), new_offset: offset };
    }

    let end = (offset + RESULT_PAGE_SIZE).min(state.last_result_ids.len());
    let page = &state.last_result_ids[offset..end];
    let mut lines = vec![format!("第 {}-{} 条（共 {} 条）：", offset + 1, end, state.last_result_ids.len())];
    lines.extend(page.iter().map(|id| format!("- {id}")));
    lines.push(if end < state.last_result_ids.len() {
        "回复「下一页」查看更多。".to_string()
    } else {
        "已是最后一页。".to_string()
    });

    L0Outcome::Page { message: lines.join("\n"), new_offset: end }
}

/// Resolves "第N个"/"这个"/"那条" against `last_result_ids`, forwarding to
/// the verb implied by the rest of the message (default: show details).
fn resolve_referent(text: &str, state: &ConversationState, default_app_token: &str) -> Option<L0Outcome> {
    if state.last_result_ids.is_empty() {
        return None;
    }
    let table_id = state.active_table.clone()?;
    let index = parse_ordinal(text).or_else(|| REFERENT_DEMONSTRATIVES.iter().any(|d| text.contains(d)).then_some(0))?;
    let record_id = state.last_result_ids.get(index)?.clone();
    let active_record = Locator::new(default_app_token, table_id, record_id);

    let chain = if DELETE_VERBS.iter().any(|v| text.contains(v)) {
        vec![SkillKind::Delete]
    } else if UPDATE_VERBS.iter().any(|v| text.contains(v)) {
        vec![SkillKind::Update]
    } else {
        vec![SkillKind::Summary]
    };

    Some(L0Outcome::Referent { chain, active_record })
}

/// Parses the 1-based index out of "第N个" (ASCII digits only); returns
/// the 0-based index into `last_result_ids`.
fn parse_ordinal(text: &str) -> Option<usize> {
    let start = text.find('第')? + '第'.len_utf8();
    let rest = &text[start..];
    let end = rest.find('个')?;
    let n: usize = rest[..end].trim().parse().ok()?;
    n.checked_sub(1)
}
