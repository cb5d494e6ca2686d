//! Rule-first keyword scoring with an LLM-classify fallback, plus the
//! chain-trigger pattern that turns one message into an ordered skill
//! list.

use cw_domain::error::{Error, Result};
use cw_llm::{ChatRequest, LlmRouter, Message, ModelRole};

use crate::result::SkillKind;

struct KeywordRule {
    skill: SkillKind,
    keywords: &'static [&'static str],
    weight: f64,
}

const CHAIN_SUMMARY_TRIGGERS: &[&str] = &["然后总结", "帮我总结", "总结一下", "summarize that"];

fn keyword_rules() -> &'static [KeywordRule] {
    &[
        KeywordRule { skill: SkillKind::Query, keywords: &["我的案件", "查", "查询", "开庭", "search", "find"], weight: 0.4 },
        KeywordRule { skill: SkillKind::Create, keywords: &["新建", "创建", "添加", "create", "add"], weight: 0.45 },
        KeywordRule { skill: SkillKind::Update, keywords: &["修改", "更新", "改一下", "update"], weight: 0.45 },
        KeywordRule { skill: SkillKind::Delete, keywords: &["删除", "删掉", "delete", "remove"], weight: 0.45 },
        KeywordRule { skill: SkillKind::Summary, keywords: &["总结", "汇总", "summarize"], weight: 0.4 },
        KeywordRule { skill: SkillKind::Reminder, keywords: &["提醒我", "提醒", "remind me", "闹钟"], weight: 0.45 },
        KeywordRule { skill: SkillKind::Chitchat, keywords: &["你好", "谢谢", "hi", "hello", "thanks"], weight: 0.3 },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseVia {
    RuleDirect,
    LlmClassified,
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIntent {
    pub chain: Vec<SkillKind>,
    pub confidence: f64,
    pub via: ParseVia,
}

pub struct IntentParser {
    direct_execute_threshold: f64,
    llm_confirm_threshold: f64,
    max_hops: u32,
}

impl IntentParser {
    pub fn new(direct_execute_threshold: f64, llm_confirm_threshold: f64, max_hops: u32) -> Self {
        Self { direct_execute_threshold, llm_confirm_threshold, max_hops }
    }

    fn score_all(&self, text: &str) -> Vec<(SkillKind, f64)> {
        keyword_rules()
            .iter()
            .map(|rule| {
                let score: f64 = rule
                    .keywords
                    .iter()
                    .filter(|kw| text.contains(*kw))
                    .map(|_| rule.weight)
                    .sum();
                (rule.skill, score.min(1.0))
            })
            .collect()
    }

    fn top(&self, scores: &[(SkillKind, f64)]) -> (SkillKind, f64) {
        scores
            .iter()
            .copied()
            .fold((SkillKind::Chitchat, 0.0), |acc, (skill, score)| if score > acc.1 { (skill, score) } else { acc })
    }

    fn detect_chain(&self, text: &str, primary: SkillKind) -> Vec<SkillKind> {
        let mut chain = vec![primary];
        if primary == SkillKind::Query
            && CHAIN_SUMMARY_TRIGGERS.iter().any(|t| text.contains(t))
            && chain.len() < self.max_hops as usize
        {
            chain.push(SkillKind::Summary);
        }
        chain
    }

    /// Classify `text` using the task model, constrained to a short JSON
    /// schema (`{"skill": "..."}`), used when a keyword score falls in
    /// the "uncertain" band between the two thresholds.
    async fn classify_with_llm(&self, text: &str, llm: &LlmRouter) -> Result<SkillKind> {
        let system = Message::system(
            "Classify the user's message into exactly one skill. \
             Respond with JSON only: {\"skill\": \"query|create|update|delete|summary|reminder|chitchat\"}.",
        );
        let req = ChatRequest {
            messages: vec![system, Message::user(text)],
            json_mode: true,
            ..Default::default()
        };
        let resp = llm.chat_for_role(ModelRole::Task, req).await?;
        let parsed: serde_json::Value = serde_json::from_str(&resp.content)
            .map_err(|e| Error::Other(format!("intent classify response was not JSON: {e}")))?;
        let skill_str = parsed["skill"]
            .as_str()
            .ok_or_else(|| Error::Other("intent classify response missing `skill`".to_string()))?;
        skill_str
            .parse()
            .map_err(|_| Error::Other(format!("intent classify returned unknown skill `{skill_str}`")))
    }

    pub async fn parse(&self, text: &str, llm: &LlmRouter) -> ParsedIntent {
        let scores = self.score_all(text);
        let (top_skill, top_score) = self.top(&scores);

        if top_score >= self.direct_execute_threshold {
            return ParsedIntent { chain: self.detect_chain(text, top_skill), confidence: top_score, via: ParseVia::RuleDirect };
        }

        if top_score >= self.llm_confirm_threshold {
            if let Ok(skill) = self.classify_with_llm(text, llm).await {
                return ParsedIntent { chain: self.detect_chain(text, skill), confidence: top_score, via: ParseVia::LlmClassified };
            }
        }

        ParsedIntent { chain: vec![SkillKind::Chitchat], confidence: top_score, via: ParseVia::Default }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct StubProvider(&'static str);

    #[async_trait]
    impl cw_llm::LlmProvider for StubProvider {
        async fn chat(&self, _req: ChatRequest) -> Result<cw_llm::ChatResponse> {
            Ok(cw_llm::ChatResponse { content: self.0.to_string(), model: "stub".into() })
        }
        fn provider_id(&self) -> &str {
            "stub"
        }
    }

    fn router(reply: &'static str) -> LlmRouter {
        LlmRouter::new(
            Some(Arc::new(StubProvider(reply))),
            Some(Arc::new(StubProvider(reply))),
            std::time::Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn strong_keyword_match_dispatches_directly() {
        let parser = IntentParser::new(0.75, 0.4, 2);
        let intent = parser.parse("我的案件有哪些", &router("{}")).await;
        assert_eq!(intent.via, ParseVia::RuleDirect);
        assert_eq!(intent.chain, vec![SkillKind::Query]);
    }

    #[tokio::test]
    async fn uncertain_score_falls_back_to_llm_classification() {
        let parser = IntentParser::new(0.9, 0.1, 2);
        let intent = parser.parse("查一下", &router(r#"{"skill":"query"}"#)).await;
        assert_eq!(intent.via, ParseVia::LlmClassified);
        assert_eq!(intent.chain, vec![SkillKind::Query]);
    }

    #[tokio::test]
    async fn no_signal_falls_through_to_chitchat() {
        let parser = IntentParser::new(0.75, 0.4, 2);
        let intent = parser.parse("今天天气不错", &router("{}")).await;
        assert_eq!(intent.via, ParseVia::Default);
        assert_eq!(intent.chain, vec![SkillKind::Chitchat]);
    }

    #[tokio::test]
    async fn chain_trigger_appends_summary_after_query() {
        let parser = IntentParser::new(0.3, 0.1, 2);
        let intent = parser.parse("查询我的案件然后总结一下", &router("{}")).await;
        assert_eq!(intent.chain, vec![SkillKind::Query, SkillKind::Summary]);
    }

    #[tokio::test]
    async fn chain_is_bounded_by_max_hops() {
        let parser = IntentParser::new(0.3, 0.1, 1);
        let intent = parser.parse("查询我的案件然后总结一下", &router("{}")).await;
        assert_eq!(intent.chain, vec![SkillKind::Query]);
    }
}
