use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::error::{LlmError, LlmErrorKind};
use crate::provider::{ContentPart, LlmProvider, Message, MessageContent, Role, TextChunkStream};
use crate::stream::{parse_sse_line, LineAccumulator, SseParsed};

const PROVIDER: &str = "openai";
const REQUEST_TIMEOUT_SECS: u64 = 60;

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
            model,
        }
    }

    fn build_body(&self, system_prompt: &str, messages: &[Message], max_tokens: u32) -> serde_json::Value {
        let mut wire_messages = vec![serde_json::json!({"role": "system", "content": system_prompt})];
        wire_messages.extend(messages.iter().map(to_openai_message));
        serde_json::json!({
            "model": self.model,
            "messages": wire_messages,
            "max_tokens": max_tokens,
            "stream": true,
        })
    }
}

/// OpenAI's chat-completions wire shape inlines image parts as
/// `{"type":"image_url","image_url":{"url":"data:<mime>;base64,<data>"}}`.
fn to_openai_message(m: &Message) -> serde_json::Value {
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
                        "type": "image_url",
                        "image_url": {"url": format!("data:{media_type};base64,{data}")},
                    }),
                })
                .collect(),
        ),
    };
    serde_json::json!({"role": role, "content": content})
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
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
        let url = format!("{}/v1/chat/completions", self.base_url);

        debug!(model = %self.model, "sending streaming request to OpenAI");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "OpenAI streaming API error");
            return Err(LlmError::from_status(PROVIDER, status, text));
        }

        let (tx, rx) = mpsc::channel::<Result<String, LlmError>>(32);
        tokio::spawn(process_stream(resp, tx));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

fn transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::new(LlmErrorKind::Timeout, PROVIDER, e.to_string())
    } else {
        LlmError::new(LlmErrorKind::Upstream5xx, PROVIDER, e.to_string())
    }
}

/// OpenAI SSE is a flat `data: <json>` stream terminated by the literal
/// `data: [DONE]` sentinel (no `event:` lines, unlike Anthropic).
async fn process_stream(resp: reqwest::Response, tx: mpsc::Sender<Result<String, LlmError>>) {
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
            if let Some(SseParsed::Data(data)) = parse_sse_line(line) {
                if data.trim() == "[DONE]" {
                    return;
                }
                match serde_json::from_str::<StreamChunk>(&data) {
                    Ok(parsed) => {
                        for choice in parsed.choices {
                            if let Some(text) = choice.delta.content {
                                if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(_) => continue, // malformed payload — skip, not fatal
                }
            }
        }
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
