use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::error::{LlmError, LlmErrorKind};
use crate::provider::{ContentPart, LlmProvider, Message, MessageContent, Role, TextChunkStream};
use crate::stream::{parse_sse_line, LineAccumulator, SseParsed};

const PROVIDER: &str = "google";
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Gemini's `streamGenerateContent?alt=sse` endpoint. Has no direct teacher
/// analog; follows the same `LlmProvider` shape as `AnthropicProvider` and
/// `OpenAiProvider`, adapted to Gemini's `contents`/`parts`/`systemInstruction`
/// request shape and `candidates[].content.parts[].text` response shape.
pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GoogleProvider {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            model,
        }
    }

    fn build_body(&self, system_prompt: &str, messages: &[Message], max_tokens: u32) -> serde_json::Value {
        let contents: Vec<serde_json::Value> = messages.iter().map(to_gemini_content).collect();
        serde_json::json!({
            "contents": contents,
            "systemInstruction": {"parts": [{"text": system_prompt}]},
            "generationConfig": {"maxOutputTokens": max_tokens},
        })
    }
}

fn to_gemini_content(m: &Message) -> serde_json::Value {
    let role = match m.role {
        Role::User => "user",
        Role::Assistant => "model",
    };
    let parts: Vec<serde_json::Value> = match &m.content {
        MessageContent::Text(t) => vec![serde_json::json!({"text": t})],
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } => serde_json::json!({"text": text}),
                ContentPart::Image { media_type, data } => serde_json::json!({
                    "inlineData": {"mimeType": media_type, "data": data},
                }),
            })
            .collect(),
    };
    serde_json::json!({"role": role, "parts": parts})
}

#[async_trait]
impl LlmProvider for GoogleProvider {
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
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, self.model, self.api_key
        );

        debug!(model = %self.model, "sending streaming request to Gemini");

        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Gemini streaming API error");
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
                match serde_json::from_str::<GenerateContentResponse>(&data) {
                    Ok(parsed) => {
                        for candidate in parsed.candidates {
                            for part in candidate.content.parts {
                                if let Some(text) = part.text {
                                    if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                                        return;
                                    }
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
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_candidate_text() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"hi"}],"role":"model"}}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.candidates[0].content.parts[0].text.as_deref(), Some("hi"));
    }

    #[test]
    fn malformed_payload_does_not_panic() {
        let parsed = serde_json::from_str::<GenerateContentResponse>("not json");
        assert!(parsed.is_err());
    }
}
