//! # HTTP Error Rendering
//!
//! Validation failures render the core `ErrorPayload` verbatim with its
//! 400 status. Malformed bodies are 400s of their own. Every other failure
//! (coercion, schema resolution, engine) is logged and rendered as an
//! opaque 500; internal details never reach the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqschema_core::RequestError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body of non-validation error responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub status: u16,
}

/// Error type of the middleware and the [`ValidatedRequest`](crate::ValidatedRequest) extractor.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Failure reported by the request schema.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The body could not be read or parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A handler asked for the validated request on a route without the middleware (500).
    #[error("request was not validated by the request schema middleware")]
    NotValidated,
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Request(err) => {
                StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotValidated => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Request(RequestError::Validation(payload)) => {
                (status, Json(payload)).into_response()
            }
            Self::BadRequest(reason) => {
                let body = ErrorBody {
                    message: format!("bad request: {reason}"),
                    status: status.as_u16(),
                };
                (status, Json(body)).into_response()
            }
            other => {
                // Never expose internal error messages to clients.
                tracing::error!(error = %other, "internal server error");
                let body = ErrorBody {
                    message: "An internal error occurred".to_string(),
                    status: status.as_u16(),
                };
                (status, Json(body)).into_response()
            }
        }
    }
}
