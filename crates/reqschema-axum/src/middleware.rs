//! # Validation Middleware
//!
//! [`validate_request`] adapts an axum request to a core
//! [`RequestContext`], runs the [`RequestSchema`], and either forwards the
//! (coerced) request or rejects it with an [`ApiError`].
//!
//! Apply it per route so path parameters are matched before it runs:
//!
//! ```ignore
//! let schema = Arc::new(RequestSchema::with_defaults(definition)?);
//! let app = Router::new().route(
//!     "/orders/{id}",
//!     get(show_order).layer(from_fn_with_state(schema, validate_request)),
//! );
//! ```
//!
//! ## Extraction
//!
//! - **params**: raw path captures, as strings.
//! - **query**: `application/x-www-form-urlencoded` pairs; a repeated key
//!   becomes an array of its values.
//! - **body**: JSON for `application/json` and `+json` media types, a string
//!   map for form bodies, absent otherwise. Bodies over [`BODY_LIMIT`] and
//!   malformed JSON are rejected as bad requests.

use std::borrow::Cow;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::rejection::RawPathParamsRejection;
use axum::extract::{FromRequestParts, RawPathParams, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use reqschema_core::{Outcome, RequestContext, RequestSchema};
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::extract::{AppEnvironment, ValidatedRequest};

/// Largest request body the middleware buffers (2 MiB).
pub const BODY_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
    Other,
}

/// Validate the request against `schema` and forward it on success.
///
/// On success the handler sees the coerced JSON body (with an updated
/// `content-length`) and a [`ValidatedRequest`] extension. When a dynamic
/// schema declines the request, it is forwarded untouched and without the
/// extension.
pub async fn validate_request(
    State(schema): State<Arc<RequestSchema>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();

    let params = path_params(&mut parts).await?;
    let query = parts.uri.query().map(parse_query).unwrap_or_default();

    let bytes = axum::body::to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|e| ApiError::BadRequest(format!("cannot read request body: {e}")))?;
    let kind = body_kind(&parts.headers);
    let body = parse_body(kind, &bytes)?;

    let environment = parts
        .extensions
        .get::<AppEnvironment>()
        .cloned()
        .or_else(AppEnvironment::from_env)
        .map(|env| env.0);

    let mut ctx = RequestContext {
        body,
        query,
        params,
        environment,
    };

    match schema.check(&mut ctx)? {
        Outcome::Skipped => {
            tracing::debug!(path = %parts.uri.path(), "validation skipped");
            Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
        }
        Outcome::Validated => {
            let bytes = if kind == BodyKind::Json && !ctx.body.is_null() {
                let encoded = serde_json::to_vec(&ctx.body)
                    .map_err(|e| ApiError::BadRequest(format!("cannot encode body: {e}")))?;
                parts
                    .headers
                    .insert(header::CONTENT_LENGTH, HeaderValue::from(encoded.len()));
                Bytes::from(encoded)
            } else {
                bytes
            };

            parts.extensions.insert(ValidatedRequest {
                body: ctx.body,
                query: ctx.query,
                params: ctx.params,
            });
            Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
        }
    }
}

async fn path_params(parts: &mut Parts) -> Result<Map<String, Value>, ApiError> {
    match RawPathParams::from_request_parts(parts, &()).await {
        Ok(raw) => Ok(raw
            .iter()
            .map(|(name, value)| (name.to_string(), Value::from(value)))
            .collect()),
        // Routes without captures carry no params at all.
        Err(RawPathParamsRejection::MissingPathParams(_)) => Ok(Map::new()),
        Err(other) => Err(ApiError::BadRequest(other.body_text())),
    }
}

fn parse_query(query: &str) -> Map<String, Value> {
    collect_pairs(url::form_urlencoded::parse(query.as_bytes()))
}

/// Collect decoded pairs; repeated keys accumulate into arrays.
fn collect_pairs<'a>(pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>) -> Map<String, Value> {
    let mut fields = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value.into_owned());
        match fields.get_mut(key.as_ref()) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                fields.insert(key.into_owned(), value);
            }
        }
    }
    fields
}

fn body_kind(headers: &HeaderMap) -> BodyKind {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if mime == "application/json" || mime.ends_with("+json") {
        BodyKind::Json
    } else if mime == "application/x-www-form-urlencoded" {
        BodyKind::Form
    } else {
        BodyKind::Other
    }
}

fn parse_body(kind: BodyKind, bytes: &Bytes) -> Result<Value, ApiError> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    match kind {
        BodyKind::Json => serde_json::from_slice(bytes)
            .map_err(|e| ApiError::BadRequest(format!("malformed JSON body: {e}"))),
        BodyKind::Form => Ok(Value::Object(collect_pairs(url::form_urlencoded::parse(bytes)))),
        BodyKind::Other => Ok(Value::Null),
    }
}
