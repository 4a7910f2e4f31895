use chrono::Utc;
use uuid::Uuid;

use super::{TokenGenerator, parse_token};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Token, User};

const ISSUE_ATTEMPTS: usize = 3;

#[derive(Debug)]
pub enum TokenValidationError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    InternalError,
}

pub struct ValidatedToken {
    pub token: Token,
    pub user: Option<User>,
}

/// Creates and stores a token, retrying when the random lookup collides.
/// Returns the stored token and the raw secret to hand to the caller once.
pub fn issue_token(
    store: &dyn Store,
    generator: &TokenGenerator,
    is_admin: bool,
    user_id: Option<String>,
) -> Result<(Token, String)> {
    for _ in 0..ISSUE_ATTEMPTS {
        let generated = generator.generate()?;
        let token = Token {
            id: Uuid::new_v4().to_string(),
            token_hash: generated.hash,
            token_lookup: generated.lookup,
            is_admin,
            user_id: user_id.clone(),
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        };

        match store.create_token(&token) {
            Ok(()) => return Ok((token, generated.raw)),
            Err(Error::TokenLookupCollision) => {
                tracing::warn!("token lookup collision, regenerating");
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::TokenLookupCollision)
}

/// Validates a raw token string against the store.
/// Returns the validated token and associated user (if any).
pub fn validate_token(store: &dyn Store, raw_token: &str) -> std::result::Result<ValidatedToken, TokenValidationError> {
    let parsed = parse_token(raw_token).map_err(|_| TokenValidationError::InvalidToken)?;

    let token = store
        .get_token_by_lookup(parsed.lookup)
        .map_err(|_| TokenValidationError::InternalError)?
        .ok_or(TokenValidationError::InvalidToken)?;

    let generator = TokenGenerator::new();
    if !generator
        .verify(raw_token, &token.token_hash)
        .map_err(|_| TokenValidationError::InternalError)?
    {
        return Err(TokenValidationError::InvalidToken);
    }

    if token.expires_at.is_some_and(|expires_at| expires_at < Utc::now()) {
        return Err(TokenValidationError::TokenExpired);
    }

    let user = match &token.user_id {
        Some(user_id) => store
            .get_user(user_id)
            .map_err(|_| TokenValidationError::InternalError)?,
        None => None,
    };

    if let Err(e) = store.update_token_last_used(&token.id) {
        tracing::warn!("Failed to update token last_used_at: {e}");
    }

    Ok(ValidatedToken { token, user })
}

/// Extracts a bearer token from the Authorization header.
/// Returns None if no auth header is present.
pub fn extract_token_from_header(
    auth_header: Option<&str>,
) -> std::result::Result<Option<String>, TokenValidationError> {
    match auth_header {
        Some(header) => header
            .strip_prefix("Bearer ")
            .map(|token| Some(token.trim().to_string()))
            .ok_or(TokenValidationError::InvalidScheme),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use tempfile::TempDir;

    #[test]
    fn test_extract_bearer() {
        assert_eq!(
            extract_token_from_header(Some("Bearer abc")).unwrap(),
            Some("abc".to_string())
        );
        assert!(extract_token_from_header(None).unwrap().is_none());
        assert!(matches!(
            extract_token_from_header(Some("Basic abc")),
            Err(TokenValidationError::InvalidScheme)
        ));
    }

    #[test]
    fn test_issued_token_validates() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        store
            .create_user(&User {
                id: "user-1".to_string(),
                name: "alice".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();

        let generator = TokenGenerator::new();
        let (token, raw) =
            issue_token(&store, &generator, false, Some("user-1".to_string())).unwrap();

        let validated = validate_token(&store, &raw).unwrap();
        assert_eq!(validated.token.id, token.id);
        assert_eq!(validated.user.unwrap().name, "alice");

        assert!(matches!(
            validate_token(&store, "datacollab_0a1b2c3d_0123456789abcdef01234567"),
            Err(TokenValidationError::InvalidToken)
        ));
    }
}
