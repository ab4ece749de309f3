//! activity-digest: polls a design-file provider on behalf of many accounts,
//! distils relevant activity into chat digests, and watches credential
//! expiry.
//!
//! The binary in `main.rs` is a thin shell over these modules; integration
//! tests in `tests/` drive them directly.

pub mod api;
pub mod cli;
pub mod config;
pub mod digest;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod notification;
pub mod provider;
pub mod redact;
pub mod store;
pub mod telemetry;
pub mod vault;
