//! Table disambiguation shared by every data-touching skill: configured
//! aliases are tried first; only when nothing matches confidently is the
//! LLM asked to pick from a shortlist.

use cw_domain::error::{Error, Result};
use cw_llm::{ChatRequest, LlmRouter, Message, ModelRole};

#[derive(Debug, Clone)]
pub struct TableAlias {
    pub keywords: Vec<String>,
    pub app_token: String,
    pub table_id: String,
    pub label: String,
}

pub struct TableCatalog {
    aliases: Vec<TableAlias>,
    confidence_threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTable {
    pub app_token: String,
    pub table_id: String,
    pub confidence: f64,
}

impl TableCatalog {
    pub fn new(aliases: Vec<TableAlias>, confidence_threshold: f64) -> Self {
        Self { aliases, confidence_threshold }
    }

    fn alias_match(&self, text: &str) -> Option<&TableAlias> {
        self.aliases.iter().find(|a| a.keywords.iter().any(|kw| text.contains(kw.as_str())))
    }

    /// Resolves the table a message refers to. Falls back to asking the
    /// LLM to choose from a shortlist when no alias matches confidently
    /// and more than one table is configured; a single configured table
    /// is always used directly.
    pub async fn resolve(&self, text: &str, llm: &LlmRouter) -> Result<ResolvedTable> {
        if let Some(alias) = self.alias_match(text) {
            return Ok(ResolvedTable {
                app_token: alias.app_token.clone(),
                table_id: alias.table_id.clone(),
                confidence: 1.0,
            });
        }

        if self.aliases.len() == 1 {
            let only = &self.aliases[0];
            return Ok(ResolvedTable { app_token: only.app_token.clone(), table_id: only.table_id.clone(), confidence: 1.0 });
        }

        if self.aliases.is_empty() {
            return Err(Error::Config("no tables configured for table disambiguation".to_string()));
        }

        // Ambiguous: below the confidence threshold, ask the LLM to pick
        // from the shortlist.
        let shortlist: Vec<&str> = self.aliases.iter().map(|a| a.label.as_str()).collect();
        let system = Message::system(format!(
            "Pick the single best-matching table for the user's message from this list: {}. \
             Respond with JSON only: {{\"label\": \"...\"}}.",
            shortlist.join(", ")
        ));
        let req = ChatRequest { messages: vec![system, Message::user(text)], json_mode: true, ..Default::default() };
        let resp = llm.chat_for_role(ModelRole::Task, req).await?;
        let parsed: serde_json::Value = serde_json::from_str(&resp.content)
            .map_err(|e| Error::Other(format!("table disambiguation response was not JSON: {e}")))?;
        let label = parsed["label"]
            .as_str()
            .ok_or_else(|| Error::Other("table disambiguation response missing `label`".to_string()))?;
        let chosen = self
            .aliases
            .iter()
            .find(|a| a.label == label)
            .ok_or_else(|| Error::Other(format!("LLM chose unknown table label `{label}`")))?;
        Ok(ResolvedTable { app_token: chosen.app_token.clone(), table_id: chosen.table_id.clone(), confidence: self.confidence_threshold })
    }
}
