use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// A role in a conversation turn handed to the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One part of a multimodal message. Text parts are always supported;
/// image parts are rendered into each provider's native inline-image shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { media_type: String, data: String },
}

/// Message content is either a plain string or a list of parts, so history
/// and the current turn can carry inline images without a separate code
/// path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Approximate textual content, ignoring image bytes — used for token counting.
    pub fn text_for_counting(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

/// A single turn in the conversation passed to `generate_stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }
}

/// A lazy, finite sequence of text chunks streamed from a provider. Items
/// after the stream has started are never retried (streaming
/// failure contract) — an `Err` surfaced mid-stream ends the sequence.
pub type TextChunkStream = BoxStream<'static, Result<String, LlmError>>;

const CHARS_PER_TOKEN: usize = 4;

/// Unified interface over the three supported chat-completion APIs.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider tag used in logs and `LlmError::provider`.
    fn name(&self) -> &str;

    /// Establish a streaming chat completion. The returned stream yields
    /// text chunks as they arrive; an `Err` item ends the stream (no
    /// retry happens once chunks have started flowing — see
    /// `tutor_llm::RetryingProvider`, which wraps the *connection*
    /// attempt only).
    async fn generate_stream(
        &self,
        system_prompt: &str,
        messages: &[Message],
        max_tokens: u32,
    ) -> Result<TextChunkStream, LlmError>;

    /// Approximate, provider-agnostic token estimate: `max(1, len/4)`.
    /// Identical across providers so history budgeting stays provider-agnostic.
    fn count_tokens(&self, text: &str) -> usize {
        std::cmp::max(1, text.chars().count() / CHARS_PER_TOKEN)
    }
}
