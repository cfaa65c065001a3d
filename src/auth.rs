use bcrypt::{hash, verify, DEFAULT_COST};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::models::{AuthPayload, User};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Login required")]
    MissingToken,

    #[error("Invalid or expired token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("token signing failed: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),

    #[error("password task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    Ok(hash(password, DEFAULT_COST)?)
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    verify(password, hash).unwrap_or(false)
}

/// [`hash_password`] on the blocking pool. bcrypt is CPU bound, so request
/// handlers go through here.
pub async fn hash_password_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password)).await?
}

/// [`verify_password`] on the blocking pool.
pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool, AuthError> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await?)
}

pub fn create_jwt(user: &User, secret: &str, ttl_secs: u64) -> Result<String, AuthError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let claims = AuthPayload {
        sub: user.id.clone(),
        email: user.email.clone(),
        role: user.role,
        exp: (now + ttl_secs) as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(AuthError::Encode)
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<AuthPayload, AuthError> {
    let token_data = decode::<AuthPayload>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(AuthError::InvalidToken)?;
    Ok(token_data.claims)
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Profile, Role};
    use chrono::Utc;

    fn user(role: Role) -> User {
        User {
            id: "u1".to_string(),
            first_name: "Ama".to_string(),
            last_name: "Perera".to_string(),
            email: "ama@example.com".to_string(),
            password_hash: String::new(),
            phone: None,
            role,
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
            profile: Profile::default(),
        }
    }

    #[test]
    fn test_password_round_trip() {
        let hashed = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &hashed));
        assert!(!verify_password("wrong", &hashed));
        assert!(!verify_password("s3cret", "not-a-bcrypt-hash"));
    }

    #[tokio::test]
    async fn test_blocking_pool_helpers_match_sync_ones() {
        let hashed = hash_password_blocking("s3cret".to_string()).await.unwrap();
        assert!(verify_password("s3cret", &hashed));
        assert!(verify_password_blocking("s3cret".to_string(), hashed.clone()).await.unwrap());
        assert!(!verify_password_blocking("wrong".to_string(), hashed).await.unwrap());
    }

    #[test]
    fn test_jwt_carries_role_and_rejects_other_secret() {
        let token = create_jwt(&user(Role::Admin), "k1", 60).unwrap();
        let claims = validate_jwt(&token, "k1").unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, Role::Admin);

        assert!(matches!(validate_jwt(&token, "k2"), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_bearer_header_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
        assert!(bearer_token(Some("Basic abc")).is_err());
        assert!(bearer_token(Some("Bearer ")).is_err());
        assert!(bearer_token(None).is_err());
    }
}
