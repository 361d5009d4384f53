//! HTTP handlers for the clinic auth service.

pub mod admin;
pub mod auth;
pub mod consultants;
pub mod metrics;
pub mod patients;
