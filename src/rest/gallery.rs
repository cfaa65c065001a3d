//! `/api/gallery`: public listing and download proxy, admin CRUD and reports.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    middleware,
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{
    contains_ignore_case, message, non_blank, parse_date, require_admin, AppState, DateRange,
    QueryParams, MAX_PHOTOS_PER_UPLOAD,
};
use crate::error::{ApiError, ApiResult};
use crate::models::{EventCategory, Gallery};
use crate::report::{aggregate_monthly, MonthlyCount, ReportTable};
use crate::storage::new_id;
use crate::upload::{store_all, UploadForm};

const FOLDER: &str = "galleries";

pub fn routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    let admin = Router::new()
        .route("/", post(create_gallery))
        .route("/:id", put(update_gallery).delete(delete_gallery))
        .route("/report", get(gallery_report))
        .route("/report/table", get(gallery_report_table))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/", get(list_galleries))
        .route("/download", get(download_image))
        .route("/:id", get(get_gallery))
        .merge(admin)
}

#[derive(Deserialize, Default)]
pub struct GalleryQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Text fields shared by create and update; all three are required.
struct GalleryFields {
    name: String,
    description: String,
    category: EventCategory,
}

impl GalleryFields {
    fn from_form(form: &UploadForm) -> ApiResult<Self> {
        let (Some(name), Some(description), Some(category)) = (
            form.text("name"),
            form.text("description"),
            form.text("category"),
        ) else {
            return Err(ApiError::bad_request(
                "Name, description, and category are required",
            ));
        };

        Ok(Self {
            name: name.to_string(),
            description: description.to_string(),
            category: category.parse().map_err(ApiError::BadRequest)?,
        })
    }
}

async fn list_galleries(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<GalleryQuery>,
) -> ApiResult<Json<Vec<Gallery>>> {
    let category = match non_blank(&query.category) {
        None | Some("all") => None,
        Some(value) => Some(value.parse::<EventCategory>().map_err(ApiError::BadRequest)?),
    };
    let range = DateRange {
        start: non_blank(&query.from).map(|v| parse_date("from", v)).transpose()?,
        end: non_blank(&query.to).map(|v| parse_date("to", v)).transpose()?,
    };
    let search = non_blank(&query.search);

    let mut galleries: Vec<Gallery> = state
        .storage
        .all::<Gallery>()?
        .into_iter()
        .filter(|g| category.map_or(true, |c| g.category == c))
        .filter(|g| range.contains(g.created_at.date_naive()))
        .filter(|g| {
            search.map_or(true, |s| {
                contains_ignore_case(&g.name, s) || contains_ignore_case(&g.description, s)
            })
        })
        .collect();
    galleries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(galleries))
}

async fn get_gallery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Gallery>> {
    state
        .storage
        .get::<Gallery>(&id)?
        .map(Json)
        .ok_or(ApiError::NotFound("Gallery"))
}

async fn create_gallery(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Gallery>)> {
    let form = UploadForm::read(multipart, state.config.max_upload_bytes).await?;
    let fields = GalleryFields::from_form(&form)?;

    let cover = form
        .file("cover")
        .ok_or_else(|| ApiError::bad_request("Cover image is required"))?;
    let photo_count = form.files("photos").count();
    if photo_count == 0 {
        return Err(ApiError::bad_request("At least one gallery image is required"));
    }
    if photo_count > MAX_PHOTOS_PER_UPLOAD {
        return Err(ApiError::bad_request(format!(
            "At most {MAX_PHOTOS_PER_UPLOAD} gallery images per upload"
        )));
    }

    let cover = state.images.store(FOLDER, cover).await?;
    let photos = store_all(state.images.as_ref(), FOLDER, form.files("photos")).await?;

    let gallery = Gallery {
        id: new_id(),
        name: fields.name,
        description: fields.description,
        category: fields.category,
        cover,
        photos,
        created_at: Utc::now(),
    };
    state.storage.save(&gallery)?;

    info!(id = %gallery.id, photos = gallery.photos.len(), "gallery created");
    Ok((StatusCode::CREATED, Json(gallery)))
}

/// `keepPhotos` is a JSON array of existing photo paths; anything unparsable
/// keeps nothing.
fn kept_photos(form: &UploadForm) -> Vec<String> {
    form.text("keepPhotos")
        .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
        .unwrap_or_default()
}

async fn update_gallery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<Gallery>> {
    let mut gallery = state
        .storage
        .get::<Gallery>(&id)?
        .ok_or(ApiError::NotFound("Gallery"))?;

    let form = UploadForm::read(multipart, state.config.max_upload_bytes).await?;
    let fields = GalleryFields::from_form(&form)?;

    gallery.name = fields.name;
    gallery.description = fields.description;
    gallery.category = fields.category;

    if let Some(cover) = form.file("cover") {
        gallery.cover = state.images.store(FOLDER, cover).await?;
    }

    // Photos not listed in keepPhotos are dropped from the record only
    let mut photos = kept_photos(&form);
    photos.extend(store_all(state.images.as_ref(), FOLDER, form.files("photos")).await?);
    gallery.photos = photos;

    state.storage.save(&gallery)?;
    info!(%id, photos = gallery.photos.len(), "gallery updated");
    Ok(Json(gallery))
}

async fn delete_gallery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.storage.remove::<Gallery>(&id)? {
        return Err(ApiError::NotFound("Gallery"));
    }
    info!(%id, "gallery deleted");
    Ok(message("Gallery deleted"))
}

#[derive(Deserialize)]
pub struct DownloadQuery {
    pub url: Option<String>,
}

/// Last path segment of the URL, without the query string.
fn download_name(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let name = without_query.rsplit('/').next().unwrap_or_default();
    if name.is_empty() {
        "image.jpg".to_string()
    } else {
        name.replace('"', "")
    }
}

/// Fetch a remote image and hand it back as an attachment.
async fn download_image(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<DownloadQuery>,
) -> ApiResult<Response> {
    let url = non_blank(&query.url).ok_or_else(|| ApiError::bad_request("No url provided"))?;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ApiError::bad_request("Only http(s) URLs can be downloaded"));
    }

    let upstream = state
        .http
        .get(url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|err| {
            warn!(%url, error = %err, "image download failed");
            ApiError::Internal("Failed to download image".to_string())
        })?;

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = upstream
        .bytes()
        .await
        .map_err(|err| ApiError::Internal(format!("Failed to download image: {err}")))?;

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download_name(url)),
        )
        .body(Body::from(bytes))
        .map_err(|err| ApiError::Internal(err.to_string()))
}

fn monthly_counts(state: &AppState) -> ApiResult<Vec<MonthlyCount>> {
    let galleries = state.storage.all::<Gallery>()?;
    Ok(aggregate_monthly(
        galleries.iter().map(|g| (g.created_at, g.category)),
    ))
}

async fn gallery_report(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<MonthlyCount>>> {
    Ok(Json(monthly_counts(&state)?))
}

async fn gallery_report_table(State(state): State<Arc<AppState>>) -> ApiResult<Json<ReportTable>> {
    Ok(Json(ReportTable::for_event_categories(&monthly_counts(&state)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::testing::*;
    use serde_json::json;

    const JPEG: &[u8] = b"\xff\xd8\xff\xe0fake";

    async fn create(app: &TestApp, token: &str, name: &str, category: &str) -> Value {
        let req = multipart_request(
            "POST",
            "/api/gallery",
            Some(token),
            &[("name", name), ("description", "Evening shoot"), ("category", category)],
            &[
                ("cover", "cover.jpg", "image/jpeg", JPEG),
                ("photos[]", "one.jpg", "image/jpeg", JPEG),
                ("photos[]", "two.png", "image/png", JPEG),
            ],
        );
        let (status, body) = app.send(req).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    #[tokio::test]
    async fn test_create_returns_every_uploaded_photo() {
        let app = TestApp::new();
        let token = app.admin_token();

        let body = create(&app, &token, "Graduation", "batch").await;
        assert_eq!(body["photos"].as_array().unwrap().len(), 2);
        assert!(body["cover"].as_str().unwrap().starts_with("/uploads/cover-"));
        assert_eq!(body["category"], "batch");

        let id = body["id"].as_str().unwrap();
        let (status, fetched) = app.send(empty("GET", &format!("/api/gallery/{id}"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["name"], "Graduation");
    }

    #[tokio::test]
    async fn test_create_requires_cover_and_photos() {
        let app = TestApp::new();
        let token = app.admin_token();
        let texts = [("name", "No cover"), ("description", "d"), ("category", "social")];

        let req = multipart_request(
            "POST",
            "/api/gallery",
            Some(&token),
            &texts,
            &[("photos", "one.jpg", "image/jpeg", JPEG)],
        );
        let (status, body) = app.send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Cover image is required");

        let req = multipart_request(
            "POST",
            "/api/gallery",
            Some(&token),
            &texts,
            &[("cover", "cover.jpg", "image/jpeg", JPEG)],
        );
        let (status, body) = app.send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "At least one gallery image is required");

        let req = multipart_request(
            "POST",
            "/api/gallery",
            Some(&token),
            &texts,
            &[("cover", "notes.txt", "text/plain", &b"hello"[..])],
        );
        let (status, body) = app.send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Only image files are allowed!");

        assert_eq!(app.state.storage.all::<Gallery>().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_list_filters_and_public_access() {
        let app = TestApp::new();
        let token = app.admin_token();
        create(&app, &token, "Sunset party", "social").await;
        create(&app, &token, "Cake day", "birthday").await;

        let (status, body) = app.send(empty("GET", "/api/gallery", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
        // Newest first
        assert_eq!(body[0]["name"], "Cake day");

        let (_, body) = app.send(empty("GET", "/api/gallery?category=social", None)).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, body) = app.send(empty("GET", "/api/gallery?search=CAKE", None)).await;
        assert_eq!(body[0]["name"], "Cake day");

        let (status, _) = app.send(empty("GET", "/api/gallery?category=wedding", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_keeps_listed_photos_then_appends() {
        let app = TestApp::new();
        let token = app.admin_token();
        let created = create(&app, &token, "Festival", "cultural").await;
        let id = created["id"].as_str().unwrap();
        let keep = json!([created["photos"][1]]).to_string();

        let req = multipart_request(
            "PUT",
            &format!("/api/gallery/{id}"),
            Some(&token),
            &[
                ("name", "Festival 2024"),
                ("description", "Lights"),
                ("category", "cultural"),
                ("keepPhotos", &keep),
            ],
            &[("photos", "three.jpg", "image/jpeg", JPEG)],
        );
        let (status, body) = app.send(req).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["name"], "Festival 2024");
        assert_eq!(body["cover"], created["cover"]);
        let photos = body["photos"].as_array().unwrap();
        assert_eq!(photos.len(), 2);
        assert_eq!(photos[0], created["photos"][1]);
    }

    #[tokio::test]
    async fn test_delete_and_report() {
        let app = TestApp::new();
        let token = app.admin_token();
        let first = create(&app, &token, "A", "social").await;
        create(&app, &token, "B", "social").await;
        create(&app, &token, "C", "other").await;

        let (status, body) = app.send(empty("GET", "/api/gallery/report", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.iter().map(|r| r["count"].as_u64().unwrap()).sum::<u64>(), 3);

        let (_, table) = app.send(empty("GET", "/api/gallery/report/table", Some(&token))).await;
        assert_eq!(table["grandTotal"], 3);

        let (status, _) = app.send(empty("GET", "/api/gallery/report", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let id = first["id"].as_str().unwrap();
        let (status, body) = app.send(empty("DELETE", &format!("/api/gallery/{id}"), Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Gallery deleted");

        let (status, _) = app.send(empty("DELETE", &format!("/api/gallery/{id}"), Some(&token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_download_requires_url() {
        let app = TestApp::new();
        let (status, body) = app.send(empty("GET", "/api/gallery/download", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No url provided");

        let (status, _) = app
            .send(empty("GET", "/api/gallery/download?url=file:///etc/passwd", None))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_download_name() {
        assert_eq!(download_name("https://cdn.test/a/b/photo.jpg?x=1"), "photo.jpg");
        assert_eq!(download_name("https://cdn.test/a/"), "image.jpg");
    }
}
