//! # Extractors
//!
//! [`ValidatedRequest`] hands handlers the coerced body, query and path
//! parameters exactly as they were validated. [`AppEnvironment`] tags
//! requests with the deployment environment that drives the default
//! display-errors policy.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Process variable read when no [`AppEnvironment`] extension is present.
pub const ENVIRONMENT_VAR: &str = "APP_ENV";

/// Deployment environment tag (`development`, `production`, ...).
///
/// Insert as a request extension (for example with an `Extension` layer)
/// to override [`ENVIRONMENT_VAR`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppEnvironment(pub String);

impl AppEnvironment {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Read the tag from [`ENVIRONMENT_VAR`].
    pub fn from_env() -> Option<Self> {
        std::env::var(ENVIRONMENT_VAR).ok().map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The request inputs after coercion and successful validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidatedRequest {
    /// Parsed body; `null` when the request had none.
    pub body: Value,
    pub query: Map<String, Value>,
    pub params: Map<String, Value>,
}

impl ValidatedRequest {
    /// Deserialize the body into a typed DTO.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(self.body.clone()).map_err(|e| ApiError::BadRequest(e.to_string()))
    }

    /// Deserialize the query into a typed DTO.
    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(Value::Object(self.query.clone()))
            .map_err(|e| ApiError::BadRequest(e.to_string()))
    }

    /// Deserialize the path parameters into a typed DTO.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(Value::Object(self.params.clone()))
            .map_err(|e| ApiError::BadRequest(e.to_string()))
    }
}

impl<S> FromRequestParts<S> for ValidatedRequest
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ValidatedRequest>()
            .cloned()
            .ok_or(ApiError::NotValidated)
    }
}
