use std::sync::Arc;

use tutor_core::error::TutorError;
use tutor_store::User;

use crate::app::AppState;
use crate::auth::verify_access_token;

/// Authenticates a WS connection from its `?token=` query parameter,
/// decoding the JWT and resolving (or lazily creating) the user row it
/// names. Called once, before the socket is accepted into the turn loop —
/// failure here closes the connection with code 4001.
pub async fn authenticate(state: &Arc<AppState>, token: Option<&str>) -> Result<User, TutorError> {
    let token = token.ok_or_else(|| TutorError::Auth("missing token query parameter".to_string()))?;
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
