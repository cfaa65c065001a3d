//! The four-step booking wizard: Booking -> Payment -> OTP -> Invoice.
//!
//! This is a demo flow. Steps only apply form-level checks (required fields and
//! input patterns); no card data or OTP is ever verified against anything, and
//! submitting any well-formed OTP marks the payment as successful. Only the
//! step-1 details reach the backend, via [`BookingWizard::booking_request`].

use std::fmt;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::models::EventCategory;

pub const LOCATIONS: [&str; 3] = ["Colombo", "Kandy", "Other"];
pub const PHOTOGRAPHER_OPTIONS: [u32; 3] = [3, 4, 5];

lazy_static! {
    static ref CONTACT_NUMBER: Regex = Regex::new(r"^[0-9]{10,15}$").unwrap();
    static ref EMAIL: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref TIME: Regex = Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").unwrap();
    static ref CARD_NUMBER: Regex = Regex::new(r"^[0-9 ]{13,19}$").unwrap();
    static ref EXPIRY: Regex = Regex::new(r"^(0[1-9]|1[0-2])/\d{2}$").unwrap();
    static ref CVV: Regex = Regex::new(r"^[0-9]{3,4}$").unwrap();
    static ref OTP: Regex = Regex::new(r"^[0-9]{4,6}$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Step {
    Booking,
    Payment,
    Otp,
    Invoice,
}

impl Step {
    pub fn number(&self) -> usize {
        match self {
            Step::Booking => 1,
            Step::Payment => 2,
            Step::Otp => 3,
            Step::Invoice => 4,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Step::Booking => "Booking",
            Step::Payment => "Payment",
            Step::Otp => "OTP",
            Step::Invoice => "Invoice",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WizardError {
    #[error("cannot submit {attempted} details during the {current} step")]
    WrongStep { current: Step, attempted: Step },

    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: &'static str },

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

fn invalid(field: &'static str, reason: &'static str) -> WizardError {
    WizardError::Invalid { field, reason }
}

fn required(field: &'static str, value: &str) -> Result<(), WizardError> {
    if value.trim().is_empty() {
        return Err(invalid(field, "is required"));
    }
    Ok(())
}

fn check_pattern(field: &'static str, value: &str, pattern: &Regex) -> Result<(), WizardError> {
    required(field, value)?;
    if !pattern.is_match(value.trim()) {
        return Err(invalid(field, "has the wrong format"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetails {
    pub full_name: String,
    pub contact_number: String,
    pub email: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub location: String,
    pub guests: u32,
    pub photographers: u32,
    pub venue: String,
    /// Preselected when the flow starts from a service package.
    pub event_type: Option<EventCategory>,
}

impl BookingDetails {
    fn check(&self) -> Result<(), WizardError> {
        required("fullName", &self.full_name)?;
        check_pattern("contactNumber", &self.contact_number, &CONTACT_NUMBER)?;
        check_pattern("email", &self.email, &EMAIL)?;
        check_pattern("startTime", &self.start_time, &TIME)?;
        check_pattern("endTime", &self.end_time, &TIME)?;
        if !LOCATIONS.contains(&self.location.as_str()) {
            return Err(invalid("location", "must be one of Colombo, Kandy, Other"));
        }
        if self.guests < 1 {
            return Err(invalid("guests", "must be at least 1"));
        }
        if !PHOTOGRAPHER_OPTIONS.contains(&self.photographers) {
            return Err(invalid("photographers", "must be 3, 4 or 5"));
        }
        required("venue", &self.venue)
    }
}

#[derive(Debug, Clone)]
pub struct PaymentDetails {
    pub card_name: String,
    pub card_number: String,
    pub expiry: String,
    pub cvv: String,
}

impl PaymentDetails {
    // Pattern checks only: no Luhn, no expiry date comparison.
    fn check(&self) -> Result<(), WizardError> {
        required("cardName", &self.card_name)?;
        check_pattern("cardNumber", &self.card_number, &CARD_NUMBER)?;
        check_pattern("expiry", &self.expiry, &EXPIRY)?;
        check_pattern("cvv", &self.cvv, &CVV)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WizardPayment {
    Pending,
    Success,
}

/// Everything collected, shown on the last step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub details: BookingDetails,
    pub masked_card: String,
    pub payment_status: WizardPayment,
}

impl Invoice {
    /// "Paid" or "Pending", as displayed.
    pub fn payment_label(&self) -> &'static str {
        match self.payment_status {
            WizardPayment::Success => "Paid",
            WizardPayment::Pending => "Pending",
        }
    }

    /// PDF export of the invoice. Placeholder.
    pub fn download(&self) -> Result<Vec<u8>, WizardError> {
        Err(WizardError::NotImplemented("PDF invoice download"))
    }

    pub fn summary(&self) -> String {
        let d = &self.details;
        [
            format!("Name: {}", d.full_name),
            format!("Contact: {}", d.contact_number),
            format!("Email: {}", d.email),
            format!("Date: {}", d.date),
            format!("Time: {} - {}", d.start_time, d.end_time),
            format!("Location: {}", d.location),
            format!("Guests: {}", d.guests),
            format!("Photographers: {}", d.photographers),
            format!("Venue: {}", d.venue),
            format!("Card: {}", self.masked_card),
            format!("Payment Status: {}", self.payment_label()),
        ]
        .join("\n")
    }
}

/// Create-booking payload derived from step 1, shaped like `POST /api/bookings`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub event_type: EventCategory,
    pub event_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub event_location: String,
    pub venue: String,
    pub guests: u32,
    pub photographers: u32,
}

#[derive(Debug, Clone)]
pub struct BookingWizard {
    step: Step,
    booking: Option<BookingDetails>,
    payment: Option<PaymentDetails>,
    payment_status: WizardPayment,
}

impl Default for BookingWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingWizard {
    pub fn new() -> Self {
        Self {
            step: Step::Booking,
            booking: None,
            payment: None,
            payment_status: WizardPayment::Pending,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn payment_status(&self) -> WizardPayment {
        self.payment_status
    }

    fn expect_step(&self, attempted: Step) -> Result<(), WizardError> {
        if self.step != attempted {
            return Err(WizardError::WrongStep {
                current: self.step,
                attempted,
            });
        }
        Ok(())
    }

    /// Step 1. Any well-formed details move the flow to Payment.
    pub fn submit_booking(&mut self, details: BookingDetails) -> Result<Step, WizardError> {
        self.expect_step(Step::Booking)?;
        details.check()?;
        self.booking = Some(details);
        self.step = Step::Payment;
        Ok(self.step)
    }

    /// Step 2. No payment processor is called.
    pub fn submit_payment(&mut self, details: PaymentDetails) -> Result<Step, WizardError> {
        self.expect_step(Step::Payment)?;
        details.check()?;
        self.payment = Some(details);
        self.step = Step::Otp;
        Ok(self.step)
    }

    /// `**** **** **** 1234`, or empty before a card was entered.
    pub fn masked_card(&self) -> String {
        match &self.payment {
            Some(payment) => {
                let digits: Vec<char> = payment.card_number.chars().collect();
                let last_four: String = digits[digits.len().saturating_sub(4)..].iter().collect();
                format!("**** **** **** {last_four}")
            }
            None => String::new(),
        }
    }

    /// Step 3. The code is never checked against anything: a well-formed OTP
    /// always marks the payment successful.
    pub fn submit_otp(&mut self, code: &str) -> Result<Step, WizardError> {
        self.expect_step(Step::Otp)?;
        check_pattern("otp", code, &OTP)?;
        self.payment_status = WizardPayment::Success;
        self.step = Step::Invoice;
        Ok(self.step)
    }

    /// Step 4 only.
    pub fn invoice(&self) -> Option<Invoice> {
        if self.step != Step::Invoice {
            return None;
        }
        Some(Invoice {
            details: self.booking.clone()?,
            masked_card: self.masked_card(),
            payment_status: self.payment_status,
        })
    }

    /// Available once step 1 is done. Without a preselected event type the
    /// booking is filed under "other".
    pub fn booking_request(&self) -> Option<BookingRequest> {
        let d = self.booking.as_ref()?;
        Some(BookingRequest {
            client_name: d.full_name.trim().to_string(),
            client_email: d.email.trim().to_string(),
            client_phone: d.contact_number.trim().to_string(),
            event_type: d.event_type.unwrap_or(EventCategory::Other),
            event_date: d.date,
            start_time: d.start_time.clone(),
            end_time: d.end_time.clone(),
            event_location: d.location.clone(),
            venue: d.venue.trim().to_string(),
            guests: d.guests,
            photographers: d.photographers,
        })
    }

    /// "Go to Home": discard everything and start over.
    pub fn finish(self) -> Self {
        Self::new()
    }
}
