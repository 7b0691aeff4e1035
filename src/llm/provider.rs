use async_trait::async_trait;

use crate::errors::DeskPilotResult;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};

/// Chat-completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier used in logs.
    fn name(&self) -> &str;

    /// Sends `messages` and returns the complete reply, streamed or not.
    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> DeskPilotResult<LlmResponse>;
}
