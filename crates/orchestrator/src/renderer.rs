//! Converts a skill chain's results into a channel-neutral response, via
//! a small template pool for variant phrasing.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::result::SkillResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedResponse {
    pub text_fallback: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<serde_json::Value>,
    pub meta: RenderMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderMeta {
    pub ok: bool,
    pub skills_run: usize,
}

const PENDING_SUPERSEDED_NOTICES: &[&str] =
    &["（之前未完成的操作已被新的请求取代。）", "（上一条待处理的操作已自动取消。）"];

pub struct ResponseRenderer;

impl ResponseRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Renders the final chain output. `superseded` is `true` when a
    /// pending action was replaced this turn, adding a user-visible
    /// notice ahead of the skill's own message.
    pub fn render(&self, results: &[SkillResult], superseded: bool) -> RenderedResponse {
        let last = results.last();
        let ok = last.map(|r| r.ok).unwrap_or(false);
        let mut text = last.map(|r| r.message.clone()).unwrap_or_else(|| "没有可展示的结果。".to_string());

        if superseded {
            let mut rng = rand::thread_rng();
            let notice = PENDING_SUPERSEDED_NOTICES.choose(&mut rng).copied().unwrap_or_default();
            text = format!("{notice}\n{text}");
        }

        RenderedResponse {
            text_fallback: text,
            blocks: last.and_then(|r| r.blocks.clone()),
            meta: RenderMeta { ok, skills_run: results.len() },
        }
    }
}

impl Default for ResponseRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_last_result_message_and_ok_state() {
        let renderer = ResponseRenderer::new();
        let results = vec![SkillResult::ok("first"), SkillResult::ok("second")];
        let rendered = renderer.render(&results, false);
        assert_eq!(rendered.text_fallback, "second");
        assert!(rendered.meta.ok);
        assert_eq!(rendered.meta.skills_run, 2);
    }

    #[test]
    fn superseded_notice_is_prefixed() {
        let renderer = ResponseRenderer::new();
        let results = vec![SkillResult::ok("done")];
        let rendered = renderer.render(&results, true);
        assert!(rendered.text_fallback.ends_with("done"));
        assert!(rendered.text_fallback.len() > "done".len());
    }

    #[test]
    fn empty_chain_renders_a_fallback_message() {
        let renderer = ResponseRenderer::new();
        let rendered = renderer.render(&[], false);
        assert!(!rendered.meta.ok);
    }
}
