use tutor_core::config::UploadConfig;

use crate::types::{FileKind, PendingUpload, UploadError, DOCUMENT_EXTENSIONS, IMAGE_EXTENSIONS};

fn normalise_extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// Classifies a filename into an upload kind and the size cap that applies
/// to it. Unrecognised extensions are rejected.
pub fn classify_upload(filename: &str, config: &UploadConfig) -> Result<(FileKind, u64), UploadError> {
    let extension = normalise_extension(filename);
    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Ok((FileKind::Image, config.max_image_mb * 1024 * 1024))
    } else if DOCUMENT_EXTENSIONS.contains(&extension.as_str()) {
        Ok((FileKind::Document, config.max_document_mb * 1024 * 1024))
    } else {
        Err(UploadError::UnsupportedType(filename.to_string()))
    }
}

/// Validates the per-message caps on a batch before any file is written:
/// at least one file, and no more than `max_images`/`max_documents` of each
/// kind.
pub fn validate_batch(files: &[PendingUpload], config: &UploadConfig) -> Result<(), UploadError> {
    if files.is_empty() {
        return Err(UploadError::EmptyBatch);
    }

    let mut image_count = 0usize;
    let mut document_count = 0usize;
    for file in files {
        match classify_upload(&file.filename, config) {
            Ok((FileKind::Image, _)) => image_count += 1,
            Ok((FileKind::Document, _)) => document_count += 1,
            Err(_) => {}
        }
    }

    if image_count > config.max_images_per_message || document_count > config.max_documents_per_message {
        return Err(UploadError::TooMany {
            max_images: config.max_images_per_message,
            max_documents: config.max_documents_per_message,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> UploadConfig {
        UploadConfig {
            storage_dir: "/tmp/uploads".to_string(),
            expiry_hours: 24,
            max_images_per_message: 4,
            max_documents_per_message: 4,
            max_image_mb: 10,
            max_document_mb: 20,
            max_document_tokens: 8_000,
        }
    }

    fn pending(name: &str) -> PendingUpload {
        PendingUpload {
            filename: name.to_string(),
            content_type: "application/octet-stream".to_string(),
            bytes: vec![1, 2, 3],
        }
    }

    #[test]
    fn classifies_images_and_documents() {
        let cfg = config();
        assert_eq!(classify_upload("photo.PNG", &cfg).unwrap().0, FileKind::Image);
        assert_eq!(classify_upload("notes.ipynb", &cfg).unwrap().0, FileKind::Document);
    }

    #[test]
    fn rejects_unknown_extension() {
        let cfg = config();
        assert!(classify_upload("virus.exe", &cfg).is_err());
    }

    #[test]
    fn empty_batch_is_rejected() {
        let cfg = config();
        assert!(validate_batch(&[], &cfg).is_err());
    }

    #[test]
    fn too_many_images_is_rejected() {
        let cfg = config();
        let files: Vec<PendingUpload> = (0..5).map(|i| pending(&format!("img{i}.png"))).collect();
        assert!(validate_batch(&files, &cfg).is_err());
    }

    #[test]
    fn mixed_batch_within_caps_is_accepted() {
        let cfg = config();
        let files = vec![pending("a.png"), pending("b.pdf")];
        assert!(validate_batch(&files, &cfg).is_ok());
    }
}
