//! `/api/bookings`: public booking requests, admin management and stats.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{Datelike, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::staff::RangeQuery;
use super::{
    contains_ignore_case, message, non_blank, normalize_email, parse_date, require_admin, AppState,
    DateRange, JsonBody, QueryParams,
};
use crate::error::{ApiError, ApiResult};
use crate::models::{coerce, Booking, BookingStatus, EventCategory, PaymentStatus, Staff};
use crate::report::{aggregate_monthly, MonthlyCount};
use crate::storage::{new_id, Storage};

pub fn routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    let admin = Router::new()
        .route("/", get(list_bookings))
        .route("/stats/overview", get(booking_stats))
        .route("/report", get(booking_report))
        .route("/:id", get(get_booking).put(update_booking).delete(delete_booking))
        .route("/:id/available-staff", get(available_staff))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new().route("/", post(create_booking)).merge(admin)
}

fn load_booking(storage: &Storage, id: &str) -> ApiResult<Booking> {
    storage.get::<Booking>(id)?.ok_or(ApiError::NotFound("Booking"))
}

fn check_time(field: &str, value: &str) -> ApiResult<String> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map(|_| value.trim().to_string())
        .map_err(|_| ApiError::bad_request(format!("{field} must be HH:MM")))
}

fn check_email(value: &str) -> ApiResult<String> {
    let email = normalize_email(value);
    match email.split_once('@') {
        Some((user, domain)) if !user.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ApiError::bad_request("Please provide a valid email")),
    }
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Body of `POST /api/bookings`. Numbers may arrive as strings.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateBooking {
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub event_type: Option<String>,
    pub event_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub event_location: Option<String>,
    pub venue: Option<String>,
    #[serde(default, deserialize_with = "coerce::optional_number")]
    pub guests: Option<u32>,
    #[serde(default, deserialize_with = "coerce::optional_number")]
    pub photographers: Option<u32>,
    #[serde(default, deserialize_with = "coerce::optional_number")]
    pub event_duration: Option<f64>,
    pub description: Option<String>,
    #[serde(default, alias = "totalCost", deserialize_with = "coerce::optional_number")]
    pub total_amount: Option<f64>,
    #[serde(default, deserialize_with = "coerce::optional_number")]
    pub deposit: Option<f64>,
}

impl CreateBooking {
    fn into_booking(self) -> ApiResult<Booking> {
        let (Some(client_name), Some(client_email), Some(event_type), Some(event_date)) = (
            optional_text(self.client_name),
            optional_text(self.client_email),
            optional_text(self.event_type),
            optional_text(self.event_date),
        ) else {
            return Err(ApiError::bad_request(
                "clientName, clientEmail, eventType and eventDate are required",
            ));
        };

        let event_date = parse_date("eventDate", &event_date)?;
        if event_date < Utc::now().date_naive() {
            return Err(ApiError::bad_request("Event date cannot be in the past"));
        }

        let now = Utc::now();
        Ok(Booking {
            id: new_id(),
            client_name,
            client_email: check_email(&client_email)?,
            client_phone: optional_text(self.client_phone),
            event_type: event_type.parse().map_err(ApiError::BadRequest)?,
            event_date,
            start_time: optional_text(self.start_time)
                .map(|t| check_time("startTime", &t))
                .transpose()?,
            end_time: optional_text(self.end_time)
                .map(|t| check_time("endTime", &t))
                .transpose()?,
            event_location: optional_text(self.event_location),
            venue: optional_text(self.venue),
            guests: self.guests.unwrap_or(0),
            photographers: self.photographers.unwrap_or(0),
            event_duration: self.event_duration,
            description: optional_text(self.description),
            assigned_staff: vec![],
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            total_amount: self.total_amount.unwrap_or(0.0),
            deposit: self.deposit.unwrap_or(0.0),
            created_at: now,
            updated_at: now,
        })
    }
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<CreateBooking>,
) -> ApiResult<(StatusCode, Json<Booking>)> {
    let booking = request.into_booking()?;
    state.storage.save(&booking)?;
    info!(id = %booking.id, date = %booking.event_date, "booking created");
    Ok((StatusCode::CREATED, Json(booking)))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BookingQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub event_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

async fn list_bookings(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<BookingQuery>,
) -> ApiResult<Json<Vec<Booking>>> {
    let status = match non_blank(&query.status) {
        None | Some("all") => None,
        Some(value) => Some(value.parse::<BookingStatus>().map_err(ApiError::BadRequest)?),
    };
    let event_type = match non_blank(&query.event_type) {
        None | Some("all") => None,
        Some(value) => Some(value.parse::<EventCategory>().map_err(ApiError::BadRequest)?),
    };
    let range = DateRange::parse(query.start_date.as_deref(), query.end_date.as_deref())?;
    let search = non_blank(&query.search);

    let mut bookings: Vec<Booking> = state
        .storage
        .all::<Booking>()?
        .into_iter()
        .filter(|b| status.map_or(true, |s| b.status == s))
        .filter(|b| event_type.map_or(true, |t| b.event_type == t))
        .filter(|b| range.contains(b.event_date))
        .filter(|b| {
            search.map_or(true, |q| {
                contains_ignore_case(&b.client_name, q)
                    || contains_ignore_case(&b.client_email, q)
                    || b.event_location.as_deref().is_some_and(|l| contains_ignore_case(l, q))
                    || b.venue.as_deref().is_some_and(|v| contains_ignore_case(v, q))
            })
        })
        .collect();
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(bookings))
}

async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Booking>> {
    Ok(Json(load_booking(&state.storage, &id)?))
}

/// Partial update; status changes are not restricted to any order.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBooking {
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub event_type: Option<String>,
    pub event_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub event_location: Option<String>,
    pub venue: Option<String>,
    #[serde(default, deserialize_with = "coerce::optional_number")]
    pub guests: Option<u32>,
    #[serde(default, deserialize_with = "coerce::optional_number")]
    pub photographers: Option<u32>,
    #[serde(default, deserialize_with = "coerce::optional_number")]
    pub event_duration: Option<f64>,
    pub description: Option<String>,
    pub status: Option<BookingStatus>,
    pub payment_status: Option<PaymentStatus>,
    #[serde(default, alias = "totalCost", deserialize_with = "coerce::optional_number")]
    pub total_amount: Option<f64>,
    #[serde(default, deserialize_with = "coerce::optional_number")]
    pub deposit: Option<f64>,
}

impl UpdateBooking {
    fn apply(self, booking: &mut Booking) -> ApiResult<()> {
        if let Some(name) = optional_text(self.client_name) {
            booking.client_name = name;
        }
        if let Some(email) = optional_text(self.client_email) {
            booking.client_email = check_email(&email)?;
        }
        if let Some(date) = optional_text(self.event_date) {
            booking.event_date = parse_date("eventDate", &date)?;
        }
        if let Some(time) = optional_text(self.start_time) {
            booking.start_time = Some(check_time("startTime", &time)?);
        }
        if let Some(time) = optional_text(self.end_time) {
            booking.end_time = Some(check_time("endTime", &time)?);
        }
        if let Some(phone) = self.client_phone {
            booking.client_phone = optional_text(Some(phone));
        }
        if let Some(location) = self.event_location {
            booking.event_location = optional_text(Some(location));
        }
        if let Some(venue) = self.venue {
            booking.venue = optional_text(Some(venue));
        }
        if let Some(description) = self.description {
            booking.description = optional_text(Some(description));
        }
        if let Some(event_type) = optional_text(self.event_type) {
            booking.event_type = event_type.parse().map_err(ApiError::BadRequest)?;
        }
        if let Some(guests) = self.guests {
            booking.guests = guests;
        }
        if let Some(photographers) = self.photographers {
            booking.photographers = photographers;
        }
        if self.event_duration.is_some() {
            booking.event_duration = self.event_duration;
        }
        if let Some(status) = self.status {
            booking.status = status;
        }
        if let Some(payment_status) = self.payment_status {
            booking.payment_status = payment_status;
        }
        if let Some(total) = self.total_amount {
            booking.total_amount = total;
        }
        if let Some(deposit) = self.deposit {
            booking.deposit = deposit;
        }
        booking.updated_at = Utc::now();
        Ok(())
    }
}

async fn update_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(update): JsonBody<UpdateBooking>,
) -> ApiResult<Json<Booking>> {
    let mut booking = load_booking(&state.storage, &id)?;
    update.apply(&mut booking)?;
    state.storage.save(&booking)?;
    sync_assignments(&state.storage, &booking)?;
    info!(%id, status = booking.status.key(), "booking updated");
    Ok(Json(booking))
}

/// Copies the booking's status, date and type onto the matching assignment
/// of every staff member on it.
fn sync_assignments(storage: &Storage, booking: &Booking) -> ApiResult<()> {
    for assigned in &booking.assigned_staff {
        let Some(mut staff) = storage.get::<Staff>(&assigned.staff_id)? else {
            continue;
        };
        let mut changed = false;
        for assignment in staff
            .assigned_bookings
            .iter_mut()
            .filter(|a| a.booking_id == booking.id)
        {
            assignment.status = booking.status.into();
            assignment.event_date = booking.event_date;
            assignment.event_type = booking.event_type;
            changed = true;
        }
        if changed {
            staff.updated_at = Utc::now();
            storage.save(&staff)?;
        }
    }
    Ok(())
}

/// Also drops the booking from every assigned staff member's list.
async fn delete_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let booking = load_booking(&state.storage, &id)?;

    for assignment in &booking.assigned_staff {
        if let Some(mut staff) = state.storage.get::<Staff>(&assignment.staff_id)? {
            staff.assigned_bookings.retain(|a| a.booking_id != id);
            staff.updated_at = Utc::now();
            state.storage.save(&staff)?;
        }
    }

    state.storage.remove::<Booking>(&id)?;
    info!(%id, "booking deleted");
    Ok(message("Booking deleted successfully"))
}

/// Active staff free on the booking's weekday and not already on it.
async fn available_staff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Staff>>> {
    let booking = load_booking(&state.storage, &id)?;
    let weekday = booking.event_date.weekday();

    let staff = state
        .storage
        .all::<Staff>()?
        .into_iter()
        .filter(|s| s.is_active && s.availability.on(weekday) && !booking.is_assigned(&s.id))
        .collect();
    Ok(Json(staff))
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BookingStats {
    pub total_bookings: usize,
    pub total_revenue: f64,
    pub total_deposits: f64,
    pub bookings_by_status: BTreeMap<&'static str, usize>,
    pub bookings_by_type: BTreeMap<&'static str, usize>,
}

impl BookingStats {
    pub fn from_bookings(bookings: &[Booking]) -> Self {
        let mut bookings_by_status: BTreeMap<&'static str, usize> =
            BookingStatus::ALL.iter().map(|s| (s.key(), 0)).collect();
        let mut bookings_by_type = BTreeMap::new();
        for booking in bookings {
            *bookings_by_status.entry(booking.status.key()).or_default() += 1;
            *bookings_by_type.entry(booking.event_type.key()).or_default() += 1;
        }

        Self {
            total_bookings: bookings.len(),
            total_revenue: bookings.iter().map(|b| b.total_amount).sum(),
            total_deposits: bookings.iter().map(|b| b.deposit).sum(),
            bookings_by_status,
            bookings_by_type,
        }
    }
}

async fn booking_stats(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<RangeQuery>,
) -> ApiResult<Json<BookingStats>> {
    let range = query.range()?;
    let bookings: Vec<Booking> = state
        .storage
        .all::<Booking>()?
        .into_iter()
        .filter(|b| range.contains(b.event_date))
        .collect();
    Ok(Json(BookingStats::from_bookings(&bookings)))
}

/// Monthly counts by event date and event type.
async fn booking_report(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<MonthlyCount>>> {
    let bookings = state.storage.all::<Booking>()?;
    Ok(Json(aggregate_monthly(
        bookings.iter().map(|b| (b.event_date, b.event_type)),
    )))
}
