use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub programming_level: u8,
    pub maths_level: u8,
    pub effective_programming_level: f32,
    pub effective_maths_level: f32,
    pub last_embedding: Option<Vec<f32>>,
    pub last_embedding_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSession {
    pub id: String,
    pub user_id: String,
    pub session_type: String,
    pub created_at: DateTime<Utc>,
}

/// Returned by `list_sessions_for_user`: session id, a short
/// preview of the first user message, and the creation time.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub preview: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub hint_level_used: Option<u8>,
    pub problem_difficulty: Option<u8>,
    pub maths_difficulty: Option<u8>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub attachment_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyTokenUsage {
    pub user_id: String,
    pub date: NaiveDate,
    pub input_tokens_used: u64,
    pub output_tokens_used: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedFileRow {
    pub id: String,
    pub user_id: String,
    pub original_filename: String,
    pub stored_filename: String,
    pub content_type: String,
    pub file_type: String,
    pub size_bytes: u64,
    pub storage_path: String,
    pub extracted_text: Option<String>,
    pub expires_at: DateTime<Utc>,
}
