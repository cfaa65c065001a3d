//! REST API layer (Axum).
//!
//! One route set per resource under `/api`, uploaded images served from
//! `/uploads`. Reads of the public site (galleries, services) and booking
//! creation are open; everything else needs an admin JWT issued by
//! `POST /api/auth/login`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, FromRequest, FromRequestParts, Query, Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::auth::{bearer_token, validate_jwt};
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::models::Role;
use crate::storage::Storage;
use crate::upload::{CloudinaryStore, ImageStore, LocalDiskStore};

pub mod auth;
pub mod bookings;
pub mod gallery;
pub mod services;
pub mod staff;
pub mod users;

/// Most photos accepted in one gallery upload.
const MAX_PHOTOS_PER_UPLOAD: usize = 50;

/// Shared app state for REST handlers (Arc-wrapped for concurrency)
pub struct AppState {
    pub storage: Storage,
    pub images: Arc<dyn ImageStore>,
    pub http: reqwest::Client,
    pub config: Config,
}

impl AppState {
    /// Image store chosen from config: Cloudinary when fully configured,
    /// local disk otherwise.
    pub fn new(storage: Storage, config: Config) -> Arc<Self> {
        let images: Arc<dyn ImageStore> = match &config.cloudinary {
            Some(cloudinary) => {
                info!(cloud = %cloudinary.cloud_name, "storing images on Cloudinary");
                Arc::new(CloudinaryStore::new(cloudinary.clone()))
            }
            None => {
                info!(dir = %config.upload_dir.display(), "storing images on local disk");
                Arc::new(LocalDiskStore::new(config.upload_dir.clone()))
            }
        };
        Self::with_images(storage, config, images)
    }

    pub fn with_images(storage: Storage, config: Config, images: Arc<dyn ImageStore>) -> Arc<Self> {
        Arc::new(Self {
            storage,
            images,
            http: reqwest::Client::new(),
            config,
        })
    }
}

/// Rejects requests without a valid admin token; stores the claims in the
/// request extensions for handlers that want them.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = bearer_token(auth_header)?;
    let claims = validate_jwt(token, &state.config.jwt_secret)?;
    if claims.role != Role::Admin {
        warn!(user = %claims.email, "non-admin tried a privileged route");
        return Err(ApiError::Forbidden);
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn cors(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60))
}

/// Create the Axum router with every resource mounted under `/api`.
pub fn create_router(state: Arc<AppState>) -> Router {
    // One gallery upload may carry a cover plus a full set of photos
    let body_limit = state.config.max_upload_bytes * (MAX_PHOTOS_PER_UPLOAD + 1) + 64 * 1024;

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .nest("/api/auth", auth::routes())
        .nest("/api/gallery", gallery::routes(&state))
        .nest("/api/staff", staff::routes(&state))
        .nest("/api/bookings", bookings::routes(&state))
        .nest("/api/users", users::routes(&state))
        .nest("/api/services", services::routes(&state))
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index_handler() -> &'static str {
    "Photo studio API is running"
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let storage_ok = state.storage.flush().await.is_ok();
    let status = if storage_ok { "healthy" } else { "storage unavailable" };
    Json(json!({ "success": storage_ok, "message": status }))
}

// --- Shared handler helpers ---

/// JSON body extractor whose rejections render as `{"message": ...}`.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// Query string extractor whose rejections render as `{"message": ...}`.
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

/// `{"message": ...}` body used for deletes and other acknowledgements.
pub(crate) fn message(text: impl Into<String>) -> Json<Value> {
    Json(json!({ "message": text.into() }))
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp.
pub(crate) fn parse_date(field: &str, value: &str) -> ApiResult<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc).date_naive()))
        .map_err(|_| ApiError::bad_request(format!("{field} must be a date (YYYY-MM-DD)")))
}

/// Inclusive date window from optional query bounds; open on missing sides.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn parse(start: Option<&str>, end: Option<&str>) -> ApiResult<Self> {
        let bound = |field: &str, value: Option<&str>| {
            value
                .filter(|v| !v.trim().is_empty())
                .map(|v| parse_date(field, v))
                .transpose()
        };
        Ok(Self {
            start: bound("startDate", start)?,
            end: bound("endDate", end)?,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Treat blank query values as absent.
pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt; // For .oneshot() testing

    use crate::auth::{create_jwt, hash_password};
    use crate::models::{Booking, BookingStatus, EventCategory, PaymentStatus, Profile, User};
    use crate::storage::new_id;
    use crate::upload::tests::{multipart_body, BOUNDARY};

    pub(crate) struct TestApp {
        pub app: Router,
        pub state: Arc<AppState>,
        _uploads: TempDir,
    }

    impl TestApp {
        pub fn new() -> Self {
            let uploads = tempfile::tempdir().expect("temp upload dir");
            let storage = Storage::temporary().expect("Storage for REST test");
            let state = AppState::new(storage, Config::for_tests(uploads.path().to_path_buf()));
            Self {
                app: create_router(state.clone()),
                state,
                _uploads: uploads,
            }
        }

        /// Store a user directly and return a token for it.
        pub fn user_token(&self, email: &str, role: Role) -> String {
            let user = User {
                id: new_id(),
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
                email: email.to_string(),
                password_hash: hash_password("password1").unwrap(),
                phone: None,
                role,
                is_active: true,
                created_at: Utc::now(),
                last_login: None,
                profile: Profile::default(),
            };
            self.state.storage.save(&user).unwrap();
            create_jwt(&user, &self.state.config.jwt_secret, 60).unwrap()
        }

        pub fn admin_token(&self) -> String {
            self.user_token("admin@studio.test", Role::Admin)
        }

        /// Store a pending booking directly.
        pub fn booking(&self, event_date: NaiveDate, total_amount: f64) -> Booking {
            let now = Utc::now();
            let booking = Booking {
                id: new_id(),
                client_name: "Nimal Fernando".to_string(),
                client_email: "nimal@example.com".to_string(),
                client_phone: Some("0771234567".to_string()),
                event_type: EventCategory::Birthday,
                event_date,
                start_time: Some("10:00".to_string()),
                end_time: Some("14:00".to_string()),
                event_location: Some("Colombo".to_string()),
                venue: None,
                guests: 40,
                photographers: 3,
                event_duration: Some(4.0),
                description: None,
                assigned_staff: vec![],
                status: BookingStatus::Pending,
                payment_status: PaymentStatus::Pending,
                total_amount,
                deposit: total_amount / 4.0,
                created_at: now,
                updated_at: now,
            };
            self.state.storage.save(&booking).unwrap();
            booking
        }

        pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
            let response = self.app.clone().oneshot(req).await.expect("request");
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
            let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, body)
        }
    }

    fn builder(method: &str, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(uri);
        match token {
            Some(token) => builder.header("authorization", format!("Bearer {token}")),
            None => builder,
        }
    }

    pub(crate) fn empty(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        builder(method, uri, token).body(Body::empty()).unwrap()
    }

    pub(crate) fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        builder(method, uri, token)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub(crate) fn multipart_request(
        method: &str,
        uri: &str,
        token: Option<&str>,
        texts: &[(&str, &str)],
        files: &[(&str, &str, &str, &[u8])],
    ) -> Request<Body> {
        builder(method, uri, token)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(texts, files)))
            .unwrap()
    }
}
