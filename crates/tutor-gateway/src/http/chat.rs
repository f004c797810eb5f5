use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;

use tutor_core::error::TutorError;
use tutor_store::{ChatMessage, SessionSummary, User};
use tutor_uploads::AttachmentOut;

use crate::app::AppState;
use crate::auth::verify_access_token;

/// Extracts and verifies the bearer token on a REST request, resolving it
/// to the owning user (shares the same JWT mechanism as the WS endpoint).
pub(crate) fn authenticated_user(state: &AppState, headers: &HeaderMap) -> Result<User, TutorError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| TutorError::Auth("missing Authorization header".to_string()))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| TutorError::Auth("Authorization header must be a Bearer token".to_string()))?;
    let secret = state
        .config
        .auth
        .jwt_secret
        .as_deref()
        .ok_or_else(|| TutorError::Config("JWT secret is not configured".to_string()))?;
    let claims = verify_access_token(token, secret)?;
    state
        .store
        .get_or_create_user(&claims.sub, &claims.sub, "")
        .map_err(|e| TutorError::Store(e.to_string()))
}

fn auth_status(e: &TutorError) -> StatusCode {
    match e {
        TutorError::Auth(_) | TutorError::Config(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `GET /api/chat/sessions` — newest first.
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<SessionSummary>>, StatusCode> {
    let user = authenticated_user(&state, &headers).map_err(|e| auth_status(&e))?;
    let sessions = state
        .store
        .list_sessions_for_user(&user.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(sessions))
}

#[derive(Debug, Serialize)]
pub struct SessionMessageOut {
    pub id: String,
    pub role: String,
    pub content: String,
    pub hint_level_used: Option<u8>,
    pub problem_difficulty: Option<u8>,
    pub maths_difficulty: Option<u8>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub attachments: Vec<AttachmentOut>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// `GET /api/chat/sessions/{id}/messages` — chronological, with attachment
/// references resolved to their public payload shape.
pub async fn get_session_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<SessionMessageOut>>, StatusCode> {
    let user = authenticated_user(&state, &headers).map_err(|e| auth_status(&e))?;

    let owned = state
        .store
        .get_session(&user.id, &session_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if owned.is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    let messages = state
        .store
        .get_session_messages(&session_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let out = messages
        .into_iter()
        .map(|m| resolve_attachments(&state, &user.id, m))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(out))
}

fn resolve_attachments(
    state: &AppState,
    user_id: &str,
    message: ChatMessage,
) -> Result<SessionMessageOut, TutorError> {
    let attachments = if message.attachment_ids.is_empty() {
        Vec::new()
    } else {
        state
            .store
            .get_user_uploads_by_ids(user_id, &message.attachment_ids)
            .map_err(|e| TutorError::Store(e.to_string()))?
            .iter()
            .map(|row| AttachmentOut {
                id: row.id.clone(),
                filename: row.original_filename.clone(),
                content_type: row.content_type.clone(),
                file_type: if row.file_type == "image" {
                    tutor_uploads::FileKind::Image
                } else {
                    tutor_uploads::FileKind::Document
                },
                url: format!("/uploads/{}", row.stored_filename),
            })
            .collect()
    };

    Ok(SessionMessageOut {
        id: message.id,
        role: message.role,
        content: message.content,
        hint_level_used: message.hint_level_used,
        problem_difficulty: message.problem_difficulty,
        maths_difficulty: message.maths_difficulty,
        input_tokens: message.input_tokens,
        output_tokens: message.output_tokens,
        attachments,
        created_at: message.created_at,
    })
}

/// `DELETE /api/chat/sessions/{id}` — 404 if not owned.
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, StatusCode> {
    let user = authenticated_user(&state, &headers).map_err(|e| auth_status(&e))?;
    let deleted = state
        .store
        .delete_session(&user.id, &session_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Serialize)]
pub struct UsageOut {
    pub date: String,
    pub input_tokens_used: u64,
    pub output_tokens_used: u64,
    pub daily_input_limit: u64,
    pub daily_output_limit: u64,
    pub usage_percentage: f32,
}

/// `GET /api/chat/usage`.
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UsageOut>, StatusCode> {
    let user = authenticated_user(&state, &headers).map_err(|e| auth_status(&e))?;
    let usage = state
        .store
        .get_daily_usage(&user.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let input_limit = state.config.quotas.user_daily_input_token_limit;
    let output_limit = state.config.quotas.user_daily_output_token_limit;
    let input_pct = percentage(usage.input_tokens_used, input_limit);
    let output_pct = percentage(usage.output_tokens_used, output_limit);
    let usage_percentage = (input_pct.max(output_pct) * 10.0).round() / 10.0;

    Ok(Json(UsageOut {
        date: usage.date.to_string(),
        input_tokens_used: usage.input_tokens_used,
        output_tokens_used: usage.output_tokens_used,
        daily_input_limit: input_limit,
        daily_output_limit: output_limit,
        usage_percentage: usage_percentage.min(100.0),
    }))
}

fn percentage(used: u64, limit: u64) -> f32 {
    if limit == 0 {
        return 100.0;
    }
    (used as f32 / limit as f32) * 100.0
}
