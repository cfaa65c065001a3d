//! Studio records: galleries, staff, bookings, users and services.
//!
//! Each record is stored as a JSON document in its own Sled tree (see
//! [`crate::storage`]). Cross references (booking <-> staff) are plain ids,
//! resolved at query time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::storage::Record;

/// Event categories shared by galleries, services and booking event types.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Batch,
    Social,
    Birthday,
    Cultural,
    Other,
}

impl EventCategory {
    pub const ALL: [EventCategory; 5] = [
        EventCategory::Batch,
        EventCategory::Social,
        EventCategory::Birthday,
        EventCategory::Cultural,
        EventCategory::Other,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            EventCategory::Batch => "batch",
            EventCategory::Social => "social",
            EventCategory::Birthday => "birthday",
            EventCategory::Cultural => "cultural",
            EventCategory::Other => "other",
        }
    }

    /// Human readable label used in report headers.
    pub fn label(&self) -> &'static str {
        match self {
            EventCategory::Batch => "Batch Party",
            EventCategory::Social => "Social Gatherings",
            EventCategory::Birthday => "Birthday Parties",
            EventCategory::Cultural => "Cultural Events",
            EventCategory::Other => "Other Events",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.key() == wanted)
            .ok_or_else(|| format!("unknown category '{}'", s.trim()))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Gallery {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: EventCategory,
    pub cover: String,
    pub photos: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for Gallery {
    const COLLECTION: &'static str = "galleries";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: EventCategory,
    pub price: f64,
    pub photo: String,
    pub created_at: DateTime<Utc>,
}

impl Record for Service {
    const COLLECTION: &'static str = "services";

    fn id(&self) -> &str {
        &self.id
    }
}

// --- Staff ---

/// Weekly availability, one flag per weekday. Every day defaults to available.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct Availability {
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
}

impl Default for Availability {
    fn default() -> Self {
        Self {
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: true,
            sunday: true,
        }
    }
}

/// Partial availability update; missing days keep their current value.
#[derive(Deserialize, Debug, Clone, Copy, Default)]
pub struct AvailabilityPatch {
    pub monday: Option<bool>,
    pub tuesday: Option<bool>,
    pub wednesday: Option<bool>,
    pub thursday: Option<bool>,
    pub friday: Option<bool>,
    pub saturday: Option<bool>,
    pub sunday: Option<bool>,
}

impl Availability {
    pub fn on(&self, day: Weekday) -> bool {
        match day {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }

    pub fn merge(&mut self, patch: AvailabilityPatch) {
        let days = [
            (&mut self.monday, patch.monday),
            (&mut self.tuesday, patch.tuesday),
            (&mut self.wednesday, patch.wednesday),
            (&mut self.thursday, patch.thursday),
            (&mut self.friday, patch.friday),
            (&mut self.saturday, patch.saturday),
            (&mut self.sunday, patch.sunday),
        ];
        for (slot, value) in days {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentStatus {
    #[default]
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl AssignmentStatus {
    /// Assignments that still block the staff member from being removed.
    pub fn is_active(&self) -> bool {
        matches!(self, AssignmentStatus::Assigned | AssignmentStatus::InProgress)
    }
}

/// An assignment follows the status of its booking.
impl From<BookingStatus> for AssignmentStatus {
    fn from(status: BookingStatus) -> Self {
        match status {
            BookingStatus::Pending | BookingStatus::Confirmed => AssignmentStatus::Assigned,
            BookingStatus::InProgress => AssignmentStatus::InProgress,
            BookingStatus::Completed => AssignmentStatus::Completed,
            BookingStatus::Cancelled => AssignmentStatus::Cancelled,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StaffAssignment {
    pub booking_id: String,
    pub event_date: NaiveDate,
    pub event_type: EventCategory,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub hours: f64,
    #[serde(default)]
    pub status: AssignmentStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    pub id: String,
    pub name: String,
    pub title: String,
    pub email: String,
    pub phone: Option<String>,
    pub photo: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub availability: Availability,
    pub hourly_rate: f64,
    pub is_active: bool,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default)]
    pub assigned_bookings: Vec<StaffAssignment>,
    #[serde(default)]
    pub total_events: u32,
    #[serde(default)]
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Staff {
    pub fn has_active_assignments(&self) -> bool {
        self.assigned_bookings.iter().any(|a| a.status.is_active())
    }
}

impl Record for Staff {
    const COLLECTION: &'static str = "staff";

    fn id(&self) -> &str {
        &self.id
    }
}

// --- Bookings ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 5] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in-progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.key() == s.trim())
            .ok_or_else(|| format!("unknown booking status '{}'", s.trim()))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AssignedStaff {
    pub staff_id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub hours: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub event_type: EventCategory,
    pub event_date: NaiveDate,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub event_location: Option<String>,
    pub venue: Option<String>,
    #[serde(default)]
    pub guests: u32,
    #[serde(default)]
    pub photographers: u32,
    pub event_duration: Option<f64>,
    pub description: Option<String>,
    #[serde(default)]
    pub assigned_staff: Vec<AssignedStaff>,
    #[serde(default)]
    pub status: BookingStatus,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub total_amount: f64,
    #[serde(default)]
    pub deposit: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_assigned(&self, staff_id: &str) -> bool {
        self.assigned_staff.iter().any(|a| a.staff_id == staff_id)
    }

    pub fn hours_for(&self, staff_id: &str) -> f64 {
        self.assigned_staff
            .iter()
            .find(|a| a.staff_id == staff_id)
            .map(|a| a.hours)
            .unwrap_or(0.0)
    }
}

impl Record for Booking {
    const COLLECTION: &'static str = "bookings";

    fn id(&self) -> &str {
        &self.id
    }
}

// --- Users ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    #[default]
    Client,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            "client" => Ok(Role::Client),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub profile_picture: Option<String>,
}

/// Stored user record. Never returned directly; see [`PublicUser`].
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub profile: Profile,
}

impl Record for User {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> &str {
        &self.id
    }
}

/// User as exposed over the API, without the credential hash.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub profile: Profile,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
            last_login: user.last_login,
            profile: user.profile.clone(),
        }
    }
}

/// JWT claims issued at login and checked on privileged routes.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthPayload {
    pub sub: String, // user id
    pub email: String,
    pub role: Role,
    pub exp: usize,
}

/// Lenient numeric fields: JSON numbers or numeric strings (form posts send
/// everything as text).
pub mod coerce {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr<T> {
        Num(T),
        Str(String),
    }

    pub fn number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + FromStr,
        T::Err: Display,
    {
        match NumOrStr::<T>::deserialize(deserializer)? {
            NumOrStr::Num(n) => Ok(n),
            NumOrStr::Str(s) => s.trim().parse().map_err(D::Error::custom),
        }
    }

    /// Like [`number`], but `null` and blank strings become `None`.
    /// Use together with `#[serde(default)]`.
    pub fn optional_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + FromStr,
        T::Err: Display,
    {
        match Option::<NumOrStr<T>>::deserialize(deserializer)? {
            None => Ok(None),
            Some(NumOrStr::Num(n)) => Ok(Some(n)),
            Some(NumOrStr::Str(s)) if s.trim().is_empty() => Ok(None),
            Some(NumOrStr::Str(s)) => s.trim().parse().map(Some).map_err(D::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Numbers {
        #[serde(deserialize_with = "coerce::number")]
        guests: u32,
        #[serde(default, deserialize_with = "coerce::optional_number")]
        total: Option<f64>,
    }

    #[test]
    fn numeric_strings_are_coerced() {
        let parsed: Numbers = serde_json::from_value(json!({"guests": "120", "total": "450.5"})).unwrap();
        assert_eq!(parsed.guests, 120);
        assert_eq!(parsed.total, Some(450.5));

        let parsed: Numbers = serde_json::from_value(json!({"guests": 8, "total": ""})).unwrap();
        assert_eq!(parsed.guests, 8);
        assert_eq!(parsed.total, None);

        assert!(serde_json::from_value::<Numbers>(json!({"guests": "many"})).is_err());
    }

    #[test]
    fn availability_merge_keeps_missing_days() {
        let mut availability = Availability::default();
        availability.merge(AvailabilityPatch {
            sunday: Some(false),
            ..Default::default()
        });
        assert!(!availability.on(Weekday::Sun));
        assert!(availability.on(Weekday::Mon));
    }

    #[test]
    fn statuses_use_wire_names() {
        assert_eq!(serde_json::to_value(BookingStatus::InProgress).unwrap(), json!("in-progress"));
        assert_eq!(serde_json::to_value(AssignmentStatus::InProgress).unwrap(), json!("in-progress"));
        assert_eq!("Birthday".parse::<EventCategory>().unwrap(), EventCategory::Birthday);
        assert!("wedding".parse::<EventCategory>().is_err());
    }

    #[test]
    fn assignment_status_follows_booking() {
        assert_eq!(AssignmentStatus::from(BookingStatus::Confirmed), AssignmentStatus::Assigned);
        assert!(AssignmentStatus::from(BookingStatus::InProgress).is_active());
        assert!(!AssignmentStatus::from(BookingStatus::Completed).is_active());
        assert!(!AssignmentStatus::from(BookingStatus::Cancelled).is_active());
    }
}
