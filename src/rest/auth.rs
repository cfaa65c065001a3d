//! `/api/auth`: registration and login. Both are public.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::users::{check_password, find_by_email, UserResponse};
use super::{normalize_email, AppState, JsonBody};
use crate::auth::{create_jwt, hash_password_blocking, verify_password_blocking};
use crate::error::{ApiError, ApiResult};
use crate::models::{Profile, PublicUser, Role, User};
use crate::storage::new_id;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
}

/// `name` is accepted in place of first/last name and split on the first
/// space.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub phone: Option<String>,
}

impl RegisterRequest {
    fn names(&self) -> Option<(String, String)> {
        let first = self.first_name.as_deref().map(str::trim).filter(|v| !v.is_empty());
        let last = self.last_name.as_deref().map(str::trim).unwrap_or_default();
        if let Some(first) = first {
            return Some((first.to_string(), last.to_string()));
        }

        let name = self.name.as_deref().map(str::trim).filter(|v| !v.is_empty())?;
        let (first, last) = name.split_once(' ').unwrap_or((name, ""));
        Some((first.to_string(), last.trim().to_string()))
    }
}

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub token: String,
    pub user: PublicUser,
}

async fn register_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let Some((first_name, last_name)) = payload.names() else {
        return Err(ApiError::bad_request("Name, email and password are required"));
    };
    let email = normalize_email(&payload.email);
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("Please provide a valid email"));
    }
    check_password(&payload.password)?;
    if find_by_email(&state.storage, &email)?.is_some() {
        return Err(ApiError::bad_request("Email already exists"));
    }

    let user = User {
        id: new_id(),
        first_name,
        last_name,
        email,
        password_hash: hash_password_blocking(payload.password.clone()).await?,
        phone: payload.phone.filter(|p| !p.trim().is_empty()),
        role: Role::Client,
        is_active: true,
        created_at: Utc::now(),
        last_login: None,
        profile: Profile::default(),
    };
    state.storage.save(&user)?;

    info!(id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            message: "User registered successfully".to_string(),
            user: PublicUser::from(&user),
        }),
    ))
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let mut user = find_by_email(&state.storage, &payload.email)?.ok_or_else(invalid)?;
    if !verify_password_blocking(payload.password, user.password_hash.clone()).await? {
        warn!(email = %user.email, "failed login");
        return Err(invalid());
    }
    if !user.is_active {
        return Err(ApiError::Unauthorized("Account is disabled".to_string()));
    }

    user.last_login = Some(Utc::now());
    state.storage.save(&user)?;

    let token = create_jwt(&user, &state.config.jwt_secret, state.config.jwt_ttl_secs)?;
    info!(email = %user.email, role = ?user.role, "user logged in");
    Ok(Json(LoginResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::validate_jwt;
    use crate::rest::testing::*;
    use serde_json::json;

    #[test]
    fn test_name_split() {
        let request = RegisterRequest {
            name: Some("Ama  Kumari Perera".to_string()),
            ..Default::default()
        };
        assert_eq!(request.names(), Some(("Ama".to_string(), "Kumari Perera".to_string())));

        let request = RegisterRequest {
            name: Some("Ama".to_string()),
            first_name: Some(" ".to_string()),
            ..Default::default()
        };
        assert_eq!(request.names(), Some(("Ama".to_string(), String::new())));
        assert_eq!(RegisterRequest::default().names(), None);
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let app = TestApp::new();
        let register = json!({"name": "Ruwan Jayasuriya", "email": "Ruwan@Example.com", "password": "hunter22"});

        let (status, body) = app.send(json_request("POST", "/api/auth/register", None, register.clone())).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["user"]["role"], "client");
        assert_eq!(body["user"]["lastName"], "Jayasuriya");
        assert!(body["user"].get("passwordHash").is_none());

        let (status, body) = app.send(json_request("POST", "/api/auth/register", None, register)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email already exists");

        let login = json!({"email": "ruwan@example.com", "password": "hunter22"});
        let (status, body) = app.send(json_request("POST", "/api/auth/login", None, login)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["user"]["lastLogin"].is_string());

        let claims = validate_jwt(body["token"].as_str().unwrap(), &app.state.config.jwt_secret).unwrap();
        assert_eq!(claims.role, Role::Client);
        assert_eq!(claims.email, "ruwan@example.com");

        // A client token does not open admin routes
        let token = body["token"].as_str().unwrap();
        let (status, _) = app.send(empty("GET", "/api/users", Some(token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let app = TestApp::new();
        app.admin_token();

        let wrong = json!({"email": "admin@studio.test", "password": "nope"});
        let (status, body) = app.send(json_request("POST", "/api/auth/login", None, wrong)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid credentials");

        let unknown = json!({"email": "ghost@studio.test", "password": "password1"});
        let (status, _) = app.send(json_request("POST", "/api/auth/login", None, unknown)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let short = json!({"name": "Short", "email": "s@studio.test", "password": "123"});
        let (status, _) = app.send(json_request("POST", "/api/auth/register", None, short)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
