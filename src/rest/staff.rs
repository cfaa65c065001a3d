//! `/api/staff`: team members, weekly availability and booking assignments.
//! Every route here is admin only.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{
    contains_ignore_case, message, non_blank, normalize_email, require_admin, AppState, DateRange,
    JsonBody, QueryParams,
};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    coerce, AssignedStaff, AssignmentStatus, AvailabilityPatch, Booking, Staff, StaffAssignment,
};
use crate::storage::{new_id, Storage};
use crate::upload::UploadForm;

const FOLDER: &str = "staff";

pub fn routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_staff).post(create_staff))
        .route("/reports/summary", get(staff_summary))
        .route("/:id", get(get_staff).put(update_staff).delete(delete_staff))
        .route("/:id/availability", put(update_availability))
        .route("/:id/assign", post(assign_staff))
        .route("/:id/assign/:booking_id", delete(unassign_staff))
        .route("/:id/report", get(staff_report))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
}

#[derive(Deserialize, Default)]
pub struct StaffQuery {
    pub search: Option<String>,
    pub active: Option<bool>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl RangeQuery {
    pub fn range(&self) -> ApiResult<DateRange> {
        DateRange::parse(self.start_date.as_deref(), self.end_date.as_deref())
    }
}

fn load_staff(storage: &Storage, id: &str) -> ApiResult<Staff> {
    storage.get::<Staff>(id)?.ok_or(ApiError::NotFound("Staff"))
}

fn load_booking(storage: &Storage, id: &str) -> ApiResult<Booking> {
    storage.get::<Booking>(id)?.ok_or(ApiError::NotFound("Booking"))
}

fn email_taken(storage: &Storage, email: &str) -> ApiResult<bool> {
    Ok(storage.find::<Staff>(|s| normalize_email(&s.email) == email)?.is_some())
}

/// Repeated `specializations` fields, each possibly a comma separated list.
fn specializations(form: &UploadForm) -> Vec<String> {
    form.texts("specializations")
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn hourly_rate(form: &UploadForm) -> ApiResult<Option<f64>> {
    form.text("hourlyRate")
        .map(|value| value.parse::<f64>())
        .transpose()
        .map_err(|_| ApiError::bad_request("hourlyRate must be a number"))
}

async fn list_staff(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<StaffQuery>,
) -> ApiResult<Json<Vec<Staff>>> {
    let search = non_blank(&query.search);
    let mut staff: Vec<Staff> = state
        .storage
        .all::<Staff>()?
        .into_iter()
        .filter(|s| query.active.map_or(true, |active| s.is_active == active))
        .filter(|s| {
            search.map_or(true, |q| {
                contains_ignore_case(&s.name, q)
                    || contains_ignore_case(&s.title, q)
                    || contains_ignore_case(&s.email, q)
            })
        })
        .collect();
    staff.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(staff))
}

async fn get_staff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Staff>> {
    Ok(Json(load_staff(&state.storage, &id)?))
}

async fn create_staff(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Staff>)> {
    let form = UploadForm::read(multipart, state.config.max_upload_bytes).await?;

    let (Some(name), Some(title), Some(email)) =
        (form.text("name"), form.text("title"), form.text("email"))
    else {
        return Err(ApiError::bad_request("Name, title, and email are required"));
    };
    let email = normalize_email(email);
    if email_taken(&state.storage, &email)? {
        return Err(ApiError::bad_request("Email already exists"));
    }

    let photo = match form.file("photo") {
        Some(file) => Some(state.images.store(FOLDER, file).await?),
        None => None,
    };

    let now = Utc::now();
    let staff = Staff {
        id: new_id(),
        name: name.to_string(),
        title: title.to_string(),
        email,
        phone: form.text("phone").map(str::to_string),
        photo,
        description: form.text("description").map(str::to_string),
        availability: Default::default(),
        hourly_rate: hourly_rate(&form)?.unwrap_or(0.0),
        is_active: true,
        specializations: specializations(&form),
        assigned_bookings: vec![],
        total_events: 0,
        rating: 0.0,
        created_at: now,
        updated_at: now,
    };
    state.storage.save(&staff)?;

    info!(id = %staff.id, email = %staff.email, "staff member added");
    Ok((StatusCode::CREATED, Json(staff)))
}

/// Partial update: absent or blank fields keep their current value.
async fn update_staff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<Staff>> {
    let mut staff = load_staff(&state.storage, &id)?;
    let form = UploadForm::read(multipart, state.config.max_upload_bytes).await?;

    if let Some(email) = form.text("email").map(normalize_email) {
        if email != normalize_email(&staff.email) && email_taken(&state.storage, &email)? {
            return Err(ApiError::bad_request("Email already exists"));
        }
        staff.email = email;
    }
    if let Some(file) = form.file("photo") {
        staff.photo = Some(state.images.store(FOLDER, file).await?);
    }
    if let Some(name) = form.text("name") {
        staff.name = name.to_string();
    }
    if let Some(title) = form.text("title") {
        staff.title = title.to_string();
    }
    if let Some(phone) = form.text("phone") {
        staff.phone = Some(phone.to_string());
    }
    if let Some(description) = form.text("description") {
        staff.description = Some(description.to_string());
    }
    if let Some(rate) = hourly_rate(&form)? {
        staff.hourly_rate = rate;
    }
    let specializations = specializations(&form);
    if !specializations.is_empty() {
        staff.specializations = specializations;
    }
    if let Some(active) = form.text("isActive") {
        staff.is_active = active
            .parse()
            .map_err(|_| ApiError::bad_request("isActive must be true or false"))?;
    }
    staff.updated_at = Utc::now();

    state.storage.save(&staff)?;
    info!(%id, "staff member updated");
    Ok(Json(staff))
}

async fn delete_staff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let staff = load_staff(&state.storage, &id)?;
    if staff.has_active_assignments() {
        return Err(ApiError::bad_request(
            "Cannot delete staff with active bookings. Please reassign or cancel bookings first.",
        ));
    }

    state.storage.remove::<Staff>(&id)?;
    info!(%id, "staff member deleted");
    Ok(message("Staff deleted successfully"))
}

#[derive(Deserialize)]
pub struct AvailabilityUpdate {
    #[serde(default)]
    pub availability: AvailabilityPatch,
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(update): JsonBody<AvailabilityUpdate>,
) -> ApiResult<Json<Staff>> {
    let mut staff = load_staff(&state.storage, &id)?;
    staff.availability.merge(update.availability);
    staff.updated_at = Utc::now();
    state.storage.save(&staff)?;
    Ok(Json(staff))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub booking_id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default, deserialize_with = "coerce::optional_number")]
    pub hours: Option<f64>,
}

#[derive(Serialize)]
pub struct AssignResponse {
    pub message: String,
    pub booking: Booking,
    pub staff: Staff,
}

/// Booking and staff are saved one after the other; two concurrent calls
/// for the same pair can both pass the duplicate check.
async fn assign_staff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<AssignRequest>,
) -> ApiResult<Json<AssignResponse>> {
    let mut staff = load_staff(&state.storage, &id)?;
    let mut booking = load_booking(&state.storage, &request.booking_id)?;

    if booking.is_assigned(&id) {
        return Err(ApiError::bad_request("Staff already assigned to this booking"));
    }
    let hours = request.hours.unwrap_or(0.0);

    booking.assigned_staff.push(AssignedStaff {
        staff_id: id.clone(),
        role: request.role.clone(),
        hours,
    });
    booking.updated_at = Utc::now();
    state.storage.save(&booking)?;

    staff.assigned_bookings.push(StaffAssignment {
        booking_id: booking.id.clone(),
        event_date: booking.event_date,
        event_type: booking.event_type,
        role: request.role,
        hours,
        status: AssignmentStatus::from(booking.status),
    });
    staff.total_events += 1;
    staff.updated_at = Utc::now();
    state.storage.save(&staff)?;

    info!(staff = %id, booking = %booking.id, "staff assigned");
    Ok(Json(AssignResponse {
        message: "Staff assigned successfully".to_string(),
        booking,
        staff,
    }))
}

async fn unassign_staff(
    State(state): State<Arc<AppState>>,
    Path((id, booking_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let mut staff = load_staff(&state.storage, &id)?;
    let mut booking = load_booking(&state.storage, &booking_id)?;

    booking.assigned_staff.retain(|a| a.staff_id != id);
    booking.updated_at = Utc::now();
    state.storage.save(&booking)?;

    staff.assigned_bookings.retain(|a| a.booking_id != booking_id);
    staff.updated_at = Utc::now();
    state.storage.save(&staff)?;

    info!(staff = %id, booking = %booking_id, "staff removed from booking");
    Ok(message("Staff removed from booking successfully"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffOverview {
    pub name: String,
    pub title: String,
    pub email: String,
    pub total_events: u32,
    pub rating: f64,
    pub is_active: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffReport {
    pub staff: StaffOverview,
    pub bookings: Vec<Booking>,
    pub total_bookings: usize,
    pub total_hours: f64,
    pub total_revenue: f64,
}

fn bookings_in(storage: &Storage, range: DateRange) -> ApiResult<Vec<Booking>> {
    Ok(storage
        .all::<Booking>()?
        .into_iter()
        .filter(|b| range.contains(b.event_date))
        .collect())
}

fn hours_and_revenue<'a>(staff_id: &str, bookings: impl Iterator<Item = &'a Booking>) -> (usize, f64, f64) {
    bookings
        .filter(|b| b.is_assigned(staff_id))
        .fold((0, 0.0, 0.0), |(count, hours, revenue), b| {
            (count + 1, hours + b.hours_for(staff_id), revenue + b.total_amount)
        })
}

async fn staff_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    QueryParams(query): QueryParams<RangeQuery>,
) -> ApiResult<Json<StaffReport>> {
    let staff = load_staff(&state.storage, &id)?;
    let bookings: Vec<Booking> = bookings_in(&state.storage, query.range()?)?
        .into_iter()
        .filter(|b| b.is_assigned(&id))
        .collect();
    let (total_bookings, total_hours, total_revenue) = hours_and_revenue(&id, bookings.iter());

    Ok(Json(StaffReport {
        staff: StaffOverview {
            name: staff.name,
            title: staff.title,
            email: staff.email,
            total_events: staff.total_events,
            rating: staff.rating,
            is_active: staff.is_active,
        },
        bookings,
        total_bookings,
        total_hours,
        total_revenue,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffStats {
    pub id: String,
    pub name: String,
    pub title: String,
    pub total_bookings: usize,
    pub total_hours: f64,
    pub total_revenue: f64,
    pub is_active: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffSummary {
    pub total_staff: usize,
    pub active_staff: usize,
    pub total_bookings: usize,
    pub total_revenue: f64,
    pub staff_stats: Vec<StaffStats>,
}

async fn staff_summary(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<RangeQuery>,
) -> ApiResult<Json<StaffSummary>> {
    let staff = state.storage.all::<Staff>()?;
    let bookings = bookings_in(&state.storage, query.range()?)?;

    let staff_stats = staff
        .iter()
        .map(|s| {
            let (total_bookings, total_hours, total_revenue) = hours_and_revenue(&s.id, bookings.iter());
            StaffStats {
                id: s.id.clone(),
                name: s.name.clone(),
                title: s.title.clone(),
                total_bookings,
                total_hours,
                total_revenue,
                is_active: s.is_active,
            }
        })
        .collect();

    Ok(Json(StaffSummary {
        total_staff: staff.len(),
        active_staff: staff.iter().filter(|s| s.is_active).count(),
        total_bookings: bookings.len(),
        total_revenue: bookings.iter().map(|b| b.total_amount).sum(),
        staff_stats,
    }))
}
