use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use tutor_uploads::{save_uploaded_files, AttachmentOut, PendingUpload, UploadError};

use crate::app::AppState;
use crate::http::chat::authenticated_user;

/// `POST /api/chat/uploads` — multipart form upload, one or more `file`
/// parts. Accepted files are persisted to disk and recorded against the
/// caller before their attachment references are handed back.
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Vec<AttachmentOut>>, (StatusCode, String)> {
    let user = authenticated_user(&state, &headers).map_err(|_| {
        (StatusCode::UNAUTHORIZED, "authentication required".to_string())
    })?;

    let mut pending = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
            .to_vec();
        pending.push(PendingUpload { filename, content_type, bytes });
    }

    let saved = save_uploaded_files(pending, &state.config.uploads).map_err(upload_error_response)?;

    state
        .store
        .insert_uploaded_files(&user.id, &saved)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let out: Vec<AttachmentOut> = saved.iter().map(AttachmentOut::from).collect();
    Ok(Json(out))
}

fn upload_error_response(e: UploadError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}
