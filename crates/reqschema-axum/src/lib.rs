//! # reqschema-axum: Axum Adapter
//!
//! Runs a [`reqschema_core::RequestSchema`] as axum middleware.
//!
//! - [`validate_request`]: middleware for `from_fn_with_state`.
//! - [`ValidatedRequest`]: extractor for the coerced, validated inputs.
//! - [`AppEnvironment`]: per-request environment tag (falls back to `APP_ENV`).
//! - [`ApiError`]: renders validation failures as the structured 400 payload
//!   and everything else as an opaque 500.

pub mod error;
pub mod extract;
pub mod middleware;

pub use error::ApiError;
pub use extract::{AppEnvironment, ValidatedRequest};
pub use middleware::{validate_request, BODY_LIMIT};
