//! Dual-model router: a cheap "task" model for structured classification
//! calls (intent parsing, table disambiguation) and a "chat" model for
//! user-facing generation, each bound by its own timeout.

use std::sync::Arc;
use std::time::Duration;

use cw_domain::error::{Error, Result};

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Task,
    Chat,
}

pub struct LlmRouter {
    task: Option<Arc<dyn LlmProvider>>,
    chat: Option<Arc<dyn LlmProvider>>,
    timeout: Duration,
}

impl LlmRouter {
    pub fn new(
        task: Option<Arc<dyn LlmProvider>>,
        chat: Option<Arc<dyn LlmProvider>>,
        timeout: Duration,
    ) -> Self {
        Self { task, chat, timeout }
    }

    /// Route a chat request to the provider configured for `role`,
    /// bounding the call by `timeout` — the orchestrator's LLM default.
    pub async fn chat_for_role(&self, role: ModelRole, req: ChatRequest) -> Result<ChatResponse> {
        let provider = match role {
            ModelRole::Task => self.task.as_ref().or(self.chat.as_ref()),
            ModelRole::Chat => self.chat.as_ref().or(self.task.as_ref()),
        }
        .ok_or_else(|| Error::Config(format!("no LLM provider configured for role {role:?}")))?;

        match tokio::time::timeout(self.timeout, provider.chat(req)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "provider '{}' timed out after {:?}",
                provider.provider_id(),
                self.timeout
            ))),
        }
    }
}
