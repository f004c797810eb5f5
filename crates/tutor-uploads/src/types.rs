use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Extension whitelist for images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];
/// Extension whitelist for documents.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "txt", "py", "js", "ts", "csv", "ipynb"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Image,
    Document,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("please select at least one file to upload")]
    EmptyBatch,
    #[error("too many files: up to {max_images} photos and {max_documents} files per message")]
    TooMany { max_images: usize, max_documents: usize },
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("file '{0}' is empty")]
    Empty(String),
    #[error("file '{0}' is too large")]
    TooLarge(String),
    #[error("invalid .ipynb file: {0}")]
    InvalidNotebook(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One file submitted for upload, before validation.
pub struct PendingUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A file accepted into storage, ready to be persisted by the store crate.
#[derive(Debug, Clone)]
pub struct SavedUpload {
    pub id: uuid::Uuid,
    pub original_filename: String,
    pub stored_filename: String,
    pub content_type: String,
    pub file_type: FileKind,
    pub size_bytes: u64,
    pub storage_path: String,
    pub extracted_text: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// The payload returned to the client: `{id, filename,
/// content_type, file_type, url}`.
#[derive(Debug, Clone, Serialize)]
pub struct AttachmentOut {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub file_type: FileKind,
    pub url: String,
}

impl From<&SavedUpload> for AttachmentOut {
    fn from(saved: &SavedUpload) -> Self {
        Self {
            id: saved.id.to_string(),
            filename: saved.original_filename.clone(),
            content_type: saved.content_type.clone(),
            file_type: saved.file_type,
            url: format!("/uploads/{}", saved.stored_filename),
        }
    }
}
