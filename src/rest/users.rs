//! `/api/users`: account administration. Admin only.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    middleware,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{
    contains_ignore_case, message, non_blank, normalize_email, require_admin, AppState, JsonBody,
    QueryParams,
};
use crate::auth::hash_password_blocking;
use crate::error::{ApiError, ApiResult};
use crate::models::{Profile, PublicUser, Role, User};
use crate::storage::{new_id, Storage};
use crate::upload::UploadForm;

const FOLDER: &str = "profiles";
const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;
pub const MIN_PASSWORD_LEN: usize = 6;

pub fn routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/stats/overview", get(user_stats))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/:id/password", put(update_password))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
}

pub fn check_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn find_by_email(storage: &Storage, email: &str) -> ApiResult<Option<User>> {
    let email = normalize_email(email);
    Ok(storage.find::<User>(|u| normalize_email(&u.email) == email)?)
}

fn load_user(storage: &Storage, id: &str) -> ApiResult<User> {
    storage.get::<User>(id)?.ok_or(ApiError::NotFound("User"))
}

fn admin_count(storage: &Storage) -> ApiResult<usize> {
    Ok(storage.count::<User>(|u| u.role == Role::Admin)?)
}

fn parse_role(value: &str) -> ApiResult<Role> {
    value.parse().map_err(ApiError::BadRequest)
}

#[derive(Deserialize, Default)]
pub struct UserQuery {
    pub role: Option<String>,
    pub search: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    pub users: Vec<PublicUser>,
    pub total: usize,
    pub pages: usize,
    pub current_page: usize,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub message: String,
    pub user: PublicUser,
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<UserQuery>,
) -> ApiResult<Json<UserPage>> {
    let role = match non_blank(&query.role) {
        None | Some("all") => None,
        Some(value) => Some(parse_role(value)?),
    };
    let search = non_blank(&query.search);
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let mut users: Vec<User> = state
        .storage
        .all::<User>()?
        .into_iter()
        .filter(|u| role.map_or(true, |r| u.role == r))
        .filter(|u| {
            search.map_or(true, |q| {
                contains_ignore_case(&u.first_name, q)
                    || contains_ignore_case(&u.last_name, q)
                    || contains_ignore_case(&u.email, q)
            })
        })
        .collect();
    users.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = users.len();
    Ok(Json(UserPage {
        users: users
            .iter()
            .skip(page.saturating_sub(1).saturating_mul(limit))
            .take(limit)
            .map(PublicUser::from)
            .collect(),
        total,
        pages: total.div_ceil(limit),
        current_page: page,
    }))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PublicUser>> {
    Ok(Json(PublicUser::from(&load_user(&state.storage, &id)?)))
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let form = UploadForm::read(multipart, state.config.max_upload_bytes).await?;

    let (Some(first_name), Some(last_name), Some(email), Some(password)) = (
        form.text("firstName"),
        form.text("lastName"),
        form.text("email"),
        form.text("password"),
    ) else {
        return Err(ApiError::bad_request(
            "First name, last name, email, and password are required",
        ));
    };
    if find_by_email(&state.storage, email)?.is_some() {
        return Err(ApiError::bad_request("Email already exists"));
    }
    check_password(password)?;
    let role = form.text("role").map(parse_role).transpose()?.unwrap_or_default();

    let profile_picture = match form.file("profilePicture") {
        Some(file) => Some(state.images.store(FOLDER, file).await?),
        None => None,
    };

    let user = User {
        id: new_id(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: normalize_email(email),
        password_hash: hash_password_blocking(password.to_string()).await?,
        phone: form.text("phone").map(str::to_string),
        role,
        is_active: true,
        created_at: Utc::now(),
        last_login: None,
        profile: Profile {
            address: form.text("address").map(str::to_string),
            city: form.text("city").map(str::to_string),
            country: form.text("country").map(str::to_string),
            profile_picture,
        },
    };
    state.storage.save(&user)?;

    info!(id = %user.id, role = ?user.role, "user created");
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            message: "User created successfully".to_string(),
            user: PublicUser::from(&user),
        }),
    ))
}

/// Partial update. The last admin cannot be demoted.
async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<UserResponse>> {
    let mut user = load_user(&state.storage, &id)?;
    let form = UploadForm::read(multipart, state.config.max_upload_bytes).await?;

    if let Some(email) = form.text("email").map(normalize_email) {
        if email != normalize_email(&user.email) && find_by_email(&state.storage, &email)?.is_some() {
            return Err(ApiError::bad_request("Email already exists"));
        }
        user.email = email;
    }
    if let Some(role) = form.text("role").map(parse_role).transpose()? {
        if user.role == Role::Admin && role != Role::Admin && admin_count(&state.storage)? <= 1 {
            return Err(ApiError::bad_request("Cannot demote the last admin user"));
        }
        user.role = role;
    }
    if let Some(active) = form.text("isActive") {
        user.is_active = active
            .parse()
            .map_err(|_| ApiError::bad_request("isActive must be true or false"))?;
    }

    let text = |name: &str| form.text(name).map(str::to_string);
    if let Some(first_name) = text("firstName") {
        user.first_name = first_name;
    }
    if let Some(last_name) = text("lastName") {
        user.last_name = last_name;
    }
    if let Some(phone) = text("phone") {
        user.phone = Some(phone);
    }
    let profile = &mut user.profile;
    profile.address = text("address").or(profile.address.take());
    profile.city = text("city").or(profile.city.take());
    profile.country = text("country").or(profile.country.take());
    if let Some(file) = form.file("profilePicture") {
        profile.profile_picture = Some(state.images.store(FOLDER, file).await?);
    }

    state.storage.save(&user)?;
    info!(%id, "user updated");
    Ok(Json(UserResponse {
        message: "User updated successfully".to_string(),
        user: PublicUser::from(&user),
    }))
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let user = load_user(&state.storage, &id)?;
    if user.role == Role::Admin && admin_count(&state.storage)? <= 1 {
        warn!(%id, "refused to delete the last admin");
        return Err(ApiError::bad_request("Cannot delete the last admin user"));
    }

    state.storage.remove::<User>(&id)?;
    info!(%id, "user deleted");
    Ok(message("User deleted successfully"))
}

#[derive(Deserialize)]
pub struct PasswordChange {
    #[serde(default)]
    pub password: String,
}

async fn update_password(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(change): JsonBody<PasswordChange>,
) -> ApiResult<Json<Value>> {
    let mut user = load_user(&state.storage, &id)?;
    check_password(&change.password)?;
    user.password_hash = hash_password_blocking(change.password).await?;
    state.storage.save(&user)?;
    info!(%id, "password changed");
    Ok(message("Password updated successfully"))
}

#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_users: usize,
    pub total_clients: usize,
    pub total_staff: usize,
    pub total_admins: usize,
    pub active_users: usize,
    pub inactive_users: usize,
}

async fn user_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<UserStats>> {
    let users = state.storage.all::<User>()?;
    let with_role = |role: Role| users.iter().filter(|u| u.role == role).count();
    let active_users = users.iter().filter(|u| u.is_active).count();

    Ok(Json(UserStats {
        total_users: users.len(),
        total_clients: with_role(Role::Client),
        total_staff: with_role(Role::Staff),
        total_admins: with_role(Role::Admin),
        active_users,
        inactive_users: users.len() - active_users,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;
    use crate::rest::testing::*;
    use serde_json::json;

    async fn add_user(app: &TestApp, token: &str, first: &str, email: &str, role: &str) -> Value {
        let req = multipart_request(
            "POST",
            "/api/users",
            Some(token),
            &[
                ("firstName", first),
                ("lastName", "Fernando"),
                ("email", email),
                ("password", "secret123"),
                ("role", role),
                ("city", "Colombo"),
            ],
            &[("profilePicture", "me.png", "image/png", &b"\x89PNG"[..])],
        );
        let (status, body) = app.send(req).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["user"].clone()
    }

    #[tokio::test]
    async fn test_create_hides_password_and_rejects_duplicates() {
        let app = TestApp::new();
        let token = app.admin_token();

        let user = add_user(&app, &token, "Nadeesha", "nadeesha@studio.test", "staff").await;
        assert!(user.get("passwordHash").is_none());
        assert_eq!(user["role"], "staff");
        assert_eq!(user["profile"]["city"], "Colombo");
        assert!(user["profile"]["profilePicture"].as_str().unwrap().starts_with("/uploads/profilePicture-"));

        let req = multipart_request(
            "POST",
            "/api/users",
            Some(&token),
            &[
                ("firstName", "Dup"),
                ("lastName", "User"),
                ("email", "Nadeesha@Studio.test"),
                ("password", "secret123"),
            ],
            &[],
        );
        let (status, body) = app.send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email already exists");
    }

    #[tokio::test]
    async fn test_list_paginates_and_filters() {
        let app = TestApp::new();
        let token = app.admin_token();
        for i in 0..3 {
            add_user(&app, &token, &format!("Client{i}"), &format!("c{i}@studio.test"), "client").await;
        }

        let (status, page) = app
            .send(empty("GET", "/api/users?role=client&page=2&limit=2", Some(&token)))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 3);
        assert_eq!(page["pages"], 2);
        assert_eq!(page["currentPage"], 2);
        assert_eq!(page["users"].as_array().unwrap().len(), 1);

        let (_, page) = app.send(empty("GET", "/api/users?search=client1", Some(&token))).await;
        assert_eq!(page["total"], 1);
        assert_eq!(page["users"][0]["firstName"], "Client1");
    }

    #[tokio::test]
    async fn test_huge_page_numbers_return_an_empty_page() {
        let app = TestApp::new();
        let token = app.admin_token();

        let uri = format!("/api/users?page={}&limit=2", usize::MAX);
        let (status, page) = app.send(empty("GET", &uri, Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 1);
        assert_eq!(page["users"], serde_json::json!([]));

        let uri = format!("/api/users?limit={}", usize::MAX);
        let (status, page) = app.send(empty("GET", &uri, Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["pages"], 1);
    }

    #[tokio::test]
    async fn test_last_admin_is_protected() {
        let app = TestApp::new();
        let token = app.admin_token();
        let admin = app
            .state
            .storage
            .find::<User>(|u| u.role == Role::Admin)
            .unwrap()
            .unwrap();

        let (status, body) = app
            .send(empty("DELETE", &format!("/api/users/{}", admin.id), Some(&token)))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Cannot delete the last admin user");

        let req = multipart_request("PUT", &format!("/api/users/{}", admin.id), Some(&token), &[("role", "client")], &[]);
        let (status, _) = app.send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let second = add_user(&app, &token, "Second", "second@studio.test", "admin").await;
        let (status, _) = app
            .send(empty("DELETE", &format!("/api/users/{}", admin.id), Some(&token)))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(app.state.storage.get::<User>(second["id"].as_str().unwrap()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_password_and_stats() {
        let app = TestApp::new();
        let token = app.admin_token();
        let user = add_user(&app, &token, "Ishara", "ishara@studio.test", "client").await;
        let id = user["id"].as_str().unwrap();

        let (status, _) = app
            .send(json_request("PUT", &format!("/api/users/{id}/password"), Some(&token), json!({"password": "abc"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .send(json_request("PUT", &format!("/api/users/{id}/password"), Some(&token), json!({"password": "newpass99"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Password updated successfully");
        let stored = app.state.storage.get::<User>(id).unwrap().unwrap();
        assert!(verify_password("newpass99", &stored.password_hash));

        let req = multipart_request("PUT", &format!("/api/users/{id}"), Some(&token), &[("isActive", "false"), ("country", "Sri Lanka")], &[]);
        let (status, body) = app.send(req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["profile"]["city"], "Colombo");
        assert_eq!(body["user"]["profile"]["country"], "Sri Lanka");

        let (_, stats) = app.send(empty("GET", "/api/users/stats/overview", Some(&token))).await;
        assert_eq!(stats["totalUsers"], 2);
        assert_eq!(stats["totalAdmins"], 1);
        assert_eq!(stats["totalClients"], 1);
        assert_eq!(stats["inactiveUsers"], 1);
    }
}
