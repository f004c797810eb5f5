pub mod extract;
pub mod storage;
pub mod types;
pub mod validate;

pub use extract::{estimate_tokens, extract_document_text};
pub use storage::{delete_file_safely, save_uploaded_files};
pub use types::{AttachmentOut, FileKind, PendingUpload, SavedUpload, UploadError};
pub use validate::{classify_upload, validate_batch};
