use serde::Serialize;
use thiserror::Error;

/// The kinds of failure a provider request can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmErrorKind {
    Timeout,
    RateLimited,
    Upstream5xx,
    Upstream4xx,
    Malformed,
}

impl LlmErrorKind {
    /// §4.1 retry policy: transport timeout, 429, and any 5xx are retried;
    /// everything else surfaces immediately.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            LlmErrorKind::Timeout | LlmErrorKind::RateLimited | LlmErrorKind::Upstream5xx
        )
    }
}

/// `LLMError{kind, provider, detail}` — user-visible but
/// non-fatal to the connection.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{provider} LLM error ({kind:?}): {detail}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub provider: String,
    pub detail: String,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, provider: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            provider: provider.into(),
            detail: detail.into(),
        }
    }

    pub fn from_status(provider: &str, status: u16, body: impl Into<String>) -> Self {
        let kind = if status == 429 {
            LlmErrorKind::RateLimited
        } else if (500..600).contains(&status) {
            LlmErrorKind::Upstream5xx
        } else {
            LlmErrorKind::Upstream4xx
        };
        Self::new(kind, provider, format!("HTTP {status}: {}", body.into()))
    }
}
