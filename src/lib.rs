//! Photo studio backend.
//!
//! Galleries, staff, bookings, users and service packages stored as JSON
//! documents in Sled, served over an Axum REST API with JWT-protected admin
//! routes. Images go to local disk or Cloudinary.
//!
//! The booking wizard used by the CLI client lives in [`wizard`]; monthly
//! category reports in [`report`].

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod report;
// REST API module: Axum handlers, one route set per resource
pub mod rest;
pub mod storage;
pub mod upload;
pub mod wizard;
