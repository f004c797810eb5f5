use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::error::{LlmError, LlmErrorKind};
use crate::provider::{ContentPart, LlmProvider, Message, MessageContent, Role, TextChunkStream};
use crate::stream::{parse_sse_line, LineAccumulator, SseParsed};

const API_VERSION: &str = "2023-06-01";
const PROVIDER: &str = "anthropic";
const REQUEST_TIMEOUT_SECS: u64 = 60;

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            model,
        }
    }

    fn build_body(&self, system_prompt: &str, messages: &[Message], max_tokens: u32) -> serde_json::Value {
        let wire_messages: Vec<serde_json::Value> = messages.iter().map(to_anthropic_message).collect();
        serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "system": system_prompt,
            "messages": wire_messages,
            "stream": true,
        })
    }
}

fn to_anthropic_message(m: &Message) -> serde_json::Value {
    let role = match m.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let content = match &m.content {
        MessageContent::Text(t) => serde_json::json!(t),
        MessageContent::Parts(parts) => serde_json::Value::Array(
            parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => serde_json::json!({"type": "text", "text": text}),
                    ContentPart::Image { media_type, data } => serde_json::json!({
                        "type": "image",
                        "source": {"type": "base64", "media_type": media_type, "data": data},
                    }),
                })
                .collect(),
        ),
    };
    serde_json::json!({"role": role, "content": content})
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate_stream(
        &self,
        system_prompt: &str,
        messages: &[Message],
        max_tokens: u32,
    ) -> Result<TextChunkStream, LlmError> {
        let body = self.build_body(system_prompt, messages, max_tokens);
        let url = format!("{}/v1/messages", self.base_url);

        debug!(model = %self.model, "sending streaming request to Anthropic");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, PROVIDER))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Anthropic streaming API error");
            return Err(LlmError::from_status(PROVIDER, status, text));
        }

        let (tx, rx) = mpsc::channel::<Result<String, LlmError>>(32);
        tokio::spawn(process_stream(resp, tx));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

fn transport_error(e: reqwest::Error, provider: &str) -> LlmError {
    if e.is_timeout() {
        LlmError::new(LlmErrorKind::Timeout, provider, e.to_string())
    } else {
        LlmError::new(LlmErrorKind::Upstream5xx, provider, e.to_string())
    }
}

async fn process_stream(resp: reqwest::Response, tx: mpsc::Sender<Result<String, LlmError>>) {
    let mut current_event = String::new();
    let mut acc = LineAccumulator::new();
    let mut byte_stream = resp.bytes_stream();

    while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx
                    .send(Err(LlmError::new(LlmErrorKind::Timeout, PROVIDER, e.to_string())))
                    .await;
                return;
            }
        };

        for line in acc.push(&chunk) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_sse_line(line) {
                Some(SseParsed::Event(ev)) => current_event = ev,
                Some(SseParsed::Data(data)) => match handle_data(&current_event, &data) {
                    HandledEvent::Text(text) => {
                        if tx.send(Ok(text)).await.is_err() {
                            return;
                        }
                    }
                    HandledEvent::Error(msg) => {
                        let _ = tx
                            .send(Err(LlmError::new(LlmErrorKind::Malformed, PROVIDER, msg)))
                            .await;
                        return;
                    }
                    HandledEvent::Ignored => {}
                },
                None => {}
            }
        }
    }
}

enum HandledEvent {
    Text(String),
    Error(String),
    Ignored,
}

/// Decode a single SSE data payload. Malformed payloads are skipped, not
/// fatal (streaming-decode contract).
fn handle_data(event_type: &str, data: &str) -> HandledEvent {
    match event_type {
        "content_block_delta" => match serde_json::from_str::<ContentBlockDelta>(data) {
            Ok(delta) if delta.delta.delta_type == "text_delta" => match delta.delta.text {
                Some(text) => HandledEvent::Text(text),
                None => HandledEvent::Ignored,
            },
            _ => HandledEvent::Ignored,
        },
        "error" => HandledEvent::Error(data.to_string()),
        _ => HandledEvent::Ignored,
    }
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    delta: DeltaContent,
}

#[derive(Deserialize)]
struct DeltaContent {
    #[serde(rename = "type")]
    delta_type: String,
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_delta_decodes() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#;
        match handle_data("content_block_delta", data) {
            HandledEvent::Text(t) => assert_eq!(t, "hi"),
            _ => panic!("expected text"),
        }
    }

    #[test]
    fn malformed_payload_is_ignored_not_fatal() {
        match handle_data("content_block_delta", "not json") {
            HandledEvent::Ignored => {}
            _ => panic!("expected ignored"),
        }
    }

    #[test]
    fn error_event_surfaces() {
        match handle_data("error", r#"{"type":"overloaded_error"}"#) {
            HandledEvent::Error(_) => {}
            _ => panic!("expected error"),
        }
    }
}
