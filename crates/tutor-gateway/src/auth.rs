use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use tutor_core::error::TutorError;

/// Claims carried by an access token: `sub` is the user id, `token_type`
/// must be `"access"` (refresh tokens are rejected here even if otherwise
/// valid and unexpired).
#[derive(Debug, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub token_type: String,
    pub exp: usize,
}

/// Decodes and validates an HS256 access token. Expiry is checked by
/// `jsonwebtoken` itself; the `token_type` check rejects a refresh token
/// presented at the WS endpoint.
pub fn verify_access_token(token: &str, secret: &str) -> Result<AccessClaims, TutorError> {
    let data = decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| TutorError::Auth(e.to_string()))?;

    if data.claims.token_type != "access" {
        return Err(TutorError::Auth("token is not an access token".to_string()));
    }

    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_with(token_type: &str, secret: &str, exp_offset_secs: i64) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset_secs) as usize;
        let claims = serde_json::json!({
            "sub": "user-1",
            "token_type": token_type,
            "exp": exp,
        });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn accepts_valid_access_token() {
        let token = token_with("access", "secret", 3600);
        let claims = verify_access_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn rejects_refresh_token() {
        let token = token_with("refresh", "secret", 3600);
        assert!(verify_access_token(&token, "secret").is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let token = token_with("access", "secret", -60);
        assert!(verify_access_token(&token, "secret").is_err());
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = token_with("access", "secret", 3600);
        assert!(verify_access_token(&token, "wrong-secret").is_err());
    }
}
