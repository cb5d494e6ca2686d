//! The uniform shape every skill returns, and the fixed skill roster.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillKind {
    Query,
    Create,
    Update,
    Delete,
    Summary,
    Reminder,
    Chitchat,
}

impl SkillKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SkillKind::Query => "query",
            SkillKind::Create => "create",
            SkillKind::Update => "update",
            SkillKind::Delete => "delete",
            SkillKind::Summary => "summary",
            SkillKind::Reminder => "reminder",
            SkillKind::Chitchat => "chitchat",
        }
    }
}

impl std::str::FromStr for SkillKind {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(SkillKind::Query),
            "create" => Ok(SkillKind::Create),
            "update" => Ok(SkillKind::Update),
            "delete" => Ok(SkillKind::Delete),
            "summary" => Ok(SkillKind::Summary),
            "reminder" => Ok(SkillKind::Reminder),
            "chitchat" => Ok(SkillKind::Chitchat),
            _ => Err(()),
        }
    }
}

/// What a skill hands back to the router. `data` becomes the implicit
/// context for a chained next skill (e.g. Query's result list feeding
/// Summary); `blocks` carries a renderer-ready structured payload when
/// the reply is richer than plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_skill: Option<SkillKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<serde_json::Value>,
}

impl SkillResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { ok: true, data: None, message: message.into(), next_skill: None, blocks: None }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn chain_to(mut self, skill: SkillKind) -> Self {
        self.next_skill = Some(skill);
        self
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self { ok: false, data: None, message: message.into(), next_skill: None, blocks: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skill_kind_round_trips_through_str() {
        for kind in [
            SkillKind::Query,
            SkillKind::Create,
            SkillKind::Update,
            SkillKind::Delete,
            SkillKind::Summary,
            SkillKind::Reminder,
            SkillKind::Chitchat,
        ] {
            let parsed: SkillKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn refused_result_is_not_ok() {
        let result = SkillResult::refused("no");
        assert!(!result.ok);
        assert!(result.data.is_none());
    }
}
