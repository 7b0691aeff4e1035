use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::config::ModelConfig;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, StreamChunkKind};

/// Any server speaking the OpenAI `/chat/completions` protocol (vLLM, SGLang, hosted APIs).
pub struct OpenAiCompatibleProvider {
    id: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(cfg: &ModelConfig) -> DeskPilotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            id: cfg.model.clone(),
            endpoint: chat_endpoint(&cfg.base_url),
            api_key: cfg.api_key.clone(),
            client,
        })
    }
}

fn chat_endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> DeskPilotResult<LlmResponse> {
        let body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "stream": cfg.stream,
            "temperature": cfg.temperature,
            "max_tokens": cfg.max_tokens,
            "top_p": cfg.top_p,
            "frequency_penalty": cfg.frequency_penalty,
        });

        tracing::debug!(
            provider = %self.id,
            endpoint = %self.endpoint,
            messages = messages.len(),
            stream = cfg.stream,
            "sending LLM request"
        );
        tracing::debug!(body = %sanitized_for_log(&body), "request body (base64 omitted)");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(DeskPilotError::LlmProvider(format!("{status}: {err_body}")));
        }

        if cfg.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

impl OpenAiCompatibleProvider {
    async fn handle_stream(&self, response: reqwest::Response) -> DeskPilotResult<LlmResponse> {
        let mut byte_stream = response.bytes_stream();
        let mut acc = StreamAccumulator::default();

        while let Some(result) = byte_stream.next().await {
            acc.feed(&result?);
            if acc.done {
                break;
            }
        }

        let reply = acc.finish();
        tracing::info!(
            content_len = reply.content.len(),
            reasoning_len = reply.reasoning.len(),
            "LLM stream complete"
        );
        Ok(reply)
    }

    async fn handle_json(&self, response: reqwest::Response) -> DeskPilotResult<LlmResponse> {
        let json: serde_json::Value = response.json().await?;
        let reply = reply_from_json(&json)?;
        tracing::info!(
            content_len = reply.content.len(),
            reasoning_len = reply.reasoning.len(),
            "LLM JSON response received"
        );
        Ok(reply)
    }
}

fn reply_from_json(json: &serde_json::Value) -> DeskPilotResult<LlmResponse> {
    let message = &json["choices"][0]["message"];
    if message.is_null() {
        return Err(DeskPilotError::LlmProvider(format!(
            "response has no choices: {json}"
        )));
    }
    Ok(LlmResponse {
        content: message["content"].as_str().unwrap_or_default().to_string(),
        reasoning: message["reasoning_content"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
    })
}

/// Splits an SSE byte stream into lines and accumulates the deltas.
/// Buffers bytes rather than chars so multi-byte characters split across
/// network chunks survive.
#[derive(Debug, Default)]
struct StreamAccumulator {
    pending: Vec<u8>,
    content: String,
    reasoning: String,
    done: bool,
}

impl StreamAccumulator {
    fn feed(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.line(&String::from_utf8_lossy(&line));
            if self.done {
                return;
            }
        }
    }

    fn line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match sse_parser::parse_sse_line(line) {
            Ok(Some(chunk)) => match chunk.kind {
                StreamChunkKind::Reasoning => self.reasoning.push_str(&chunk.content),
                StreamChunkKind::Content => self.content.push_str(&chunk.content),
                StreamChunkKind::Done => self.done = true,
            },
            Ok(None) => {}
            Err(e) => tracing::debug!("SSE parse skipped: {e}"),
        }
    }

    fn finish(mut self) -> LlmResponse {
        if !self.done && !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.line(&String::from_utf8_lossy(&rest));
        }
        LlmResponse {
            content: self.content,
            reasoning: self.reasoning,
        }
    }
}

/// Copy of the request body with inline images replaced, for logging only.
fn sanitized_for_log(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                    if let Some(url) = part.pointer_mut("/image_url/url") {
                        *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                    }
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_url() {
        assert_eq!(
            chat_endpoint("http://localhost:8000/v1/"),
            "http://localhost:8000/v1/chat/completions"
        );
        assert_eq!(
            chat_endpoint("https://api.example.com/v1"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn accumulates_stream_across_chunk_boundaries() {
        let payload = concat!(
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"看\"}}]}\n\n",
            ": keep-alive\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"do(action=\\\"Back\\\")\"}}]}\n",
            "data: [DONE]\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n",
        )
        .as_bytes();

        let mut acc = StreamAccumulator::default();
        // Split inside the multi-byte character.
        let cut = payload.iter().position(|&b| b == 0xe7).unwrap() + 1;
        acc.feed(&payload[..cut]);
        acc.feed(&payload[cut..]);
        assert!(acc.done);
        let reply = acc.finish();
        assert_eq!(reply.reasoning, "看");
        assert_eq!(reply.content, r#"do(action="Back")"#);
    }

    #[test]
    fn trailing_line_without_newline_is_kept() {
        let mut acc = StreamAccumulator::default();
        acc.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"finish()\"}}]}");
        assert_eq!(acc.finish().content, "finish()");
    }

    #[test]
    fn json_reply_extraction() {
        let json = serde_json::json!({
            "choices": [{"message": {"content": "finish(message=\"ok\")", "reasoning_content": "done"}}]
        });
        let reply = reply_from_json(&json).unwrap();
        assert_eq!(reply.content, r#"finish(message="ok")"#);
        assert_eq!(reply.reasoning, "done");

        assert!(reply_from_json(&serde_json::json!({"error": "overloaded"})).is_err());
    }

    #[test]
    fn log_body_omits_images() {
        let body = serde_json::json!({
            "messages": [
                {"role": "system", "content": "rules"},
                {"role": "user", "content": [
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,SECRET"}},
                    {"type": "text", "text": "state"}
                ]}
            ]
        });
        let logged = sanitized_for_log(&body);
        assert!(!logged.contains("SECRET"));
        assert!(logged.contains("<omitted_base64_image>"));
        assert!(logged.contains("rules"));
    }
}
