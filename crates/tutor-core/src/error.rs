use thiserror::Error;

/// Wire-facing error taxonomy (matches the `error` taxonomy of the chat pipeline
/// spec). Individual crates raise their own typed errors; `tutor-gateway` maps
/// them into one of these kinds before turning them into a `ServerEvent::Error`
/// or a handshake close.
#[derive(Debug, Error)]
pub enum TutorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid input: {0}")]
    Input(String),

    #[error("daily token limit reached: {0}")]
    Quota(String),

    #[error("AI service error: {0}")]
    Llm(String),

    #[error("storage error: {0}")]
    Store(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TutorError {
    /// Short code, used only in logs — the WS protocol carries a human message,
    /// not a machine-readable code (see `tutor-protocol::ServerEvent::Error`).
    pub fn code(&self) -> &'static str {
        match self {
            TutorError::Config(_) => "CONFIG_ERROR",
            TutorError::Auth(_) => "AUTH_ERROR",
            TutorError::Input(_) => "INPUT_ERROR",
            TutorError::Quota(_) => "QUOTA_ERROR",
            TutorError::Llm(_) => "LLM_ERROR",
            TutorError::Store(_) => "STORE_ERROR",
            TutorError::Validation(_) => "VALIDATION_ERROR",
            TutorError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// `StoreError` is the only kind that is fatal to the connection (§7).
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, TutorError::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, TutorError>;
