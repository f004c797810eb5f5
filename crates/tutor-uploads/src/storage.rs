use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use tracing::warn;
use tutor_core::config::UploadConfig;

use crate::extract::{estimate_tokens, extract_document_text};
use crate::types::{FileKind, PendingUpload, SavedUpload, UploadError};
use crate::validate::{classify_upload, validate_batch};

fn normalise_extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// Deletes a file if it exists; failures are logged and swallowed, matching
/// the original's best-effort cleanup.
pub fn delete_file_safely(path: &str) {
    let file_path = Path::new(path);
    if file_path.exists() {
        if let Err(e) = std::fs::remove_file(file_path) {
            warn!(path, error = %e, "failed to delete upload file");
        }
    }
}

fn ensure_storage_dir(storage_dir: &str) -> Result<PathBuf, UploadError> {
    let dir = PathBuf::from(storage_dir);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Validates and persists a batch of files to disk. On any
/// failure partway through the batch, every file already written in this
/// call is deleted before the error propagates — the batch is accepted or
/// rejected as a unit.
pub fn save_uploaded_files(
    files: Vec<PendingUpload>,
    config: &UploadConfig,
) -> Result<Vec<SavedUpload>, UploadError> {
    validate_batch(&files, config)?;

    let storage_dir = ensure_storage_dir(&config.storage_dir)?;
    let expires_at = Utc::now() + Duration::hours(config.expiry_hours);

    let mut saved = Vec::with_capacity(files.len());
    let mut written_paths: Vec<PathBuf> = Vec::with_capacity(files.len());

    let result = (|| -> Result<(), UploadError> {
        for file in &files {
            let (file_type, max_bytes) = classify_upload(&file.filename, config)?;

            if file.bytes.is_empty() {
                return Err(UploadError::Empty(file.filename.clone()));
            }
            if file.bytes.len() as u64 > max_bytes {
                return Err(UploadError::TooLarge(file.filename.clone()));
            }

            let extension = normalise_extension(&file.filename);
            let stored_filename = format!("{}{extension}", uuid::Uuid::new_v4().simple());
            let storage_path = storage_dir.join(&stored_filename);
            std::fs::write(&storage_path, &file.bytes)?;
            written_paths.push(storage_path.clone());

            let mut extracted_text = None;
            if file_type == FileKind::Document {
                let text = extract_document_text(&file.filename, &file.bytes)?;
                if estimate_tokens(&text) > config.max_document_tokens {
                    return Err(UploadError::TooLarge(file.filename.clone()));
                }
                extracted_text = Some(text);
            }

            saved.push(SavedUpload {
                id: uuid::Uuid::new_v4(),
                original_filename: file.filename.clone(),
                stored_filename,
                content_type: file.content_type.clone(),
                file_type,
                size_bytes: file.bytes.len() as u64,
                storage_path: storage_path.to_string_lossy().into_owned(),
                extracted_text,
                expires_at,
            });
        }
        Ok(())
    })();

    if let Err(e) = result {
        for path in &written_paths {
            delete_file_safely(&path.to_string_lossy());
        }
        return Err(e);
    }

    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(storage_dir: &str) -> UploadConfig {
        UploadConfig {
            storage_dir: storage_dir.to_string(),
            expiry_hours: 24,
            max_images_per_message: 4,
            max_documents_per_message: 4,
            max_image_mb: 10,
            max_document_mb: 20,
            max_document_tokens: 8_000,
        }
    }

    #[test]
    fn saves_accepted_files_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path().to_str().unwrap());
        let files = vec![PendingUpload {
            filename: "notes.txt".to_string(),
            content_type: "text/plain".to_string(),
            bytes: b"hello world".to_vec(),
        }];
        let saved = save_uploaded_files(files, &cfg).unwrap();
        assert_eq!(saved.len(), 1);
        assert!(Path::new(&saved[0].storage_path).exists());
        assert_eq!(saved[0].extracted_text.as_deref(), Some("hello world"));
    }

    #[test]
    fn rejects_and_rolls_back_on_oversized_document_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path().to_str().unwrap());
        cfg.max_document_tokens = 1;
        let files = vec![
            PendingUpload {
                filename: "a.txt".to_string(),
                content_type: "text/plain".to_string(),
                bytes: b"short".to_vec(),
            },
            PendingUpload {
                filename: "b.txt".to_string(),
                content_type: "text/plain".to_string(),
                bytes: b"this text is definitely longer than one token".to_vec(),
            },
        ];
        let result = save_uploaded_files(files, &cfg);
        assert!(result.is_err());
        let remaining = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 0, "partial writes must be rolled back");
    }

    #[test]
    fn rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path().to_str().unwrap());
        let files = vec![PendingUpload {
            filename: "empty.txt".to_string(),
            content_type: "text/plain".to_string(),
            bytes: vec![],
        }];
        assert!(save_uploaded_files(files, &cfg).is_err());
    }
}
