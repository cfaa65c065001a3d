//! `/api/services`: the studio's service packages.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde_json::Value;
use tracing::info;

use super::{message, require_admin, AppState};
use crate::error::{ApiError, ApiResult};
use crate::models::{EventCategory, Service};
use crate::report::{aggregate_monthly, MonthlyCount};
use crate::storage::new_id;
use crate::upload::UploadForm;

const FOLDER: &str = "services";

pub fn routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    let admin = Router::new()
        .route("/", post(create_service))
        .route("/report", get(service_report))
        .route("/:id", put(update_service).delete(delete_service))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/", get(list_services))
        .route("/:id", get(get_service))
        .merge(admin)
}

struct ServiceFields {
    title: String,
    description: String,
    category: EventCategory,
    price: f64,
}

impl ServiceFields {
    fn from_form(form: &UploadForm) -> ApiResult<Self> {
        let (Some(title), Some(description), Some(category), Some(price)) = (
            form.text("title"),
            form.text("description"),
            form.text("category"),
            form.text("price"),
        ) else {
            return Err(ApiError::bad_request(
                "Title, description, category, and price are required.",
            ));
        };

        let price: f64 = price
            .parse()
            .map_err(|_| ApiError::bad_request("Price must be a number"))?;
        if !price.is_finite() || price < 0.0 {
            return Err(ApiError::bad_request("Price must not be negative"));
        }

        Ok(Self {
            title: title.to_string(),
            description: description.to_string(),
            category: category.parse().map_err(ApiError::BadRequest)?,
            price,
        })
    }
}

async fn list_services(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Service>>> {
    let mut services = state.storage.all::<Service>()?;
    services.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(services))
}

async fn get_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Service>> {
    state
        .storage
        .get::<Service>(&id)?
        .map(Json)
        .ok_or(ApiError::NotFound("Service"))
}

async fn create_service(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Service>)> {
    let form = UploadForm::read(multipart, state.config.max_upload_bytes).await?;
    let photo = form
        .file("photo")
        .ok_or_else(|| ApiError::bad_request("Service image is required"))?;
    let fields = ServiceFields::from_form(&form)?;

    let service = Service {
        id: new_id(),
        title: fields.title,
        description: fields.description,
        category: fields.category,
        price: fields.price,
        photo: state.images.store(FOLDER, photo).await?,
        created_at: Utc::now(),
    };
    state.storage.save(&service)?;

    info!(id = %service.id, title = %service.title, "service created");
    Ok((StatusCode::CREATED, Json(service)))
}

async fn update_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<Service>> {
    let mut service = state
        .storage
        .get::<Service>(&id)?
        .ok_or(ApiError::NotFound("Service"))?;
    let form = UploadForm::read(multipart, state.config.max_upload_bytes).await?;
    let fields = ServiceFields::from_form(&form)?;

    service.title = fields.title;
    service.description = fields.description;
    service.category = fields.category;
    service.price = fields.price;
    if let Some(photo) = form.file("photo") {
        service.photo = state.images.store(FOLDER, photo).await?;
    }

    state.storage.save(&service)?;
    info!(%id, "service updated");
    Ok(Json(service))
}

async fn delete_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.storage.remove::<Service>(&id)? {
        return Err(ApiError::NotFound("Service"));
    }
    info!(%id, "service deleted");
    Ok(message("Service deleted"))
}

async fn service_report(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<MonthlyCount>>> {
    let services = state.storage.all::<Service>()?;
    Ok(Json(aggregate_monthly(
        services.iter().map(|s| (s.created_at, s.category)),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::testing::*;

    const PHOTO: (&str, &str, &str, &[u8]) = ("photo", "pkg.jpg", "image/jpeg", b"\xff\xd8\xff");

    #[tokio::test]
    async fn test_create_requires_photo_and_fields() {
        let app = TestApp::new();
        let token = app.admin_token();
        let texts = [
            ("title", "Birthday Basic"),
            ("description", "Two hours of coverage"),
            ("category", "birthday"),
            ("price", "149.99"),
        ];

        let (status, body) = app
            .send(multipart_request("POST", "/api/services", Some(&token), &texts, &[]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Service image is required");

        let (status, _) = app
            .send(multipart_request("POST", "/api/services", Some(&token), &texts[..3], &[PHOTO]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .send(multipart_request("POST", "/api/services", Some(&token), &texts, &[PHOTO]))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["price"], 149.99);
        assert!(body["photo"].as_str().unwrap().starts_with("/uploads/photo-"));

        let (status, listed) = app.send(empty("GET", "/api/services", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_delete_and_report() {
        let app = TestApp::new();
        let token = app.admin_token();
        let texts = [
            ("title", "Cultural Full Day"),
            ("description", "All day"),
            ("category", "cultural"),
            ("price", "500"),
        ];
        let (_, created) = app
            .send(multipart_request("POST", "/api/services", Some(&token), &texts, &[PHOTO]))
            .await;
        let id = created["id"].as_str().unwrap();

        let mut changed = texts;
        changed[3] = ("price", "450");
        let (status, body) = app
            .send(multipart_request("PUT", &format!("/api/services/{id}"), Some(&token), &changed, &[]))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["price"], 450.0);
        assert_eq!(body["photo"], created["photo"]);

        let (status, _) = app
            .send(multipart_request("PUT", &format!("/api/services/{id}"), None, &changed, &[]))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, report) = app.send(empty("GET", "/api/services/report", Some(&token))).await;
        assert_eq!(report[0]["_id"]["category"], "cultural");
        assert_eq!(report[0]["count"], 1);

        let (status, _) = app.send(empty("DELETE", &format!("/api/services/{id}"), Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.send(empty("GET", &format!("/api/services/{id}"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
