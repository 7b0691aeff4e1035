// Conversation-level model client: history in, reasoning + action line out.
use std::sync::Arc;

use base64::Engine as _;

use crate::agent_engine::history::ConversationEntry;
use crate::errors::DeskPilotResult;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage, ContentPart, ImageUrl, LlmResponse, MessageContent};

/// Model reply split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReply {
    pub reasoning: Option<String>,
    pub action: String,
    /// Unmodified reply text, retained in history.
    pub raw: String,
}

pub struct ModelClient {
    provider: Arc<dyn LlmProvider>,
    call: CallConfig,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn LlmProvider>, call: CallConfig) -> Self {
        Self { provider, call }
    }

    pub async fn send(&self, history: &[ConversationEntry]) -> DeskPilotResult<ModelReply> {
        let messages = history.iter().map(to_chat_message).collect();
        let started = std::time::Instant::now();
        let response = self.provider.chat(messages, &self.call).await?;
        tracing::debug!(
            provider = self.provider.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model replied"
        );
        Ok(split_reply(response))
    }
}

fn to_chat_message(entry: &ConversationEntry) -> ChatMessage {
    let content = match &entry.image {
        Some(png) => {
            let b64 = base64::engine::general_purpose::STANDARD.encode(png);
            MessageContent::Parts(vec![
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/png;base64,{b64}"),
                    },
                },
                ContentPart::Text {
                    text: entry.text.clone(),
                },
            ])
        }
        None => MessageContent::Text(entry.text.clone()),
    };
    ChatMessage {
        role: entry.role.as_str().to_string(),
        content,
    }
}

/// Separates free-form reasoning from the action line.
///
/// The action starts at the first `finish(message=`, else at the first
/// `do(action=`, else it is whatever follows `<answer>`. Failing all three the
/// whole reply is treated as the action.
pub fn split_reply(response: LlmResponse) -> ModelReply {
    let raw = response.content;
    let (inline_reasoning, action) = split_content(&raw);
    let reasoning = inline_reasoning
        .filter(|r| !r.is_empty())
        .or_else(|| Some(response.reasoning.trim().to_string()).filter(|r| !r.is_empty()));
    ModelReply {
        reasoning,
        action,
        raw,
    }
}

fn split_content(content: &str) -> (Option<String>, String) {
    for marker in ["finish(message=", "do(action="] {
        if let Some(pos) = content.find(marker) {
            let reasoning = strip_think_tags(&content[..pos]);
            return (Some(reasoning), content[pos..].trim().to_string());
        }
    }
    if let Some((before, after)) = content.split_once("<answer>") {
        let action = after.replace("</answer>", "").trim().to_string();
        return (Some(strip_think_tags(before)), action);
    }
    (None, content.trim().to_string())
}

fn strip_think_tags(text: &str) -> String {
    text.replace("<think>", "")
        .replace("</think>", "")
        .trim()
        .to_string()
}
