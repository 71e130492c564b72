//! # reqschema-core: Request Schema Validation
//!
//! Framework-agnostic core of the request-validation middleware. Given a
//! request's body, query and path parameters and a declarative schema for
//! each, it coerces string-encoded values to their declared types,
//! validates the result, and either lets the request through or produces
//! a structured, stable error payload.
//!
//! ## Pipeline
//!
//! - **Composition** ([`compose`]): each declared section is layered over a
//!   strictness base fragment (`additionalProperties: false` in strict
//!   mode) and wrapped in one composite schema.
//! - **Coercion** ([`coerce`]): query and params strings are converted to
//!   every declared convertible type; body strings only to `date`.
//! - **Validation** ([`engine`]): a [`SchemaEngine`] checks the
//!   `{body, query, params}` instance; the default engine is backed by the
//!   `jsonschema` crate.
//! - **Reporting** ([`report`]): violations become an [`ErrorPayload`]
//!   with status 400, details shown only where the display-errors policy
//!   allows.
//!
//! [`RequestSchema`] ties these together; host adapters (such as
//! `reqschema-axum`) build a [`RequestContext`] from the framework's
//! request and call [`RequestSchema::check`].
//!
//! ## Example
//!
//! ```
//! use reqschema_core::{RequestContext, RequestSchema, SchemaDefinition};
//! use serde_json::json;
//!
//! let definition = SchemaDefinition::from_value(json!({
//!     "query": { "properties": { "page": { "type": "integer", "required": true } } }
//! }))?;
//! let schema = RequestSchema::with_defaults(definition)?;
//!
//! let mut ctx = RequestContext::new().with_query(
//!     json!({ "page": "2" }).as_object().cloned().unwrap_or_default(),
//! );
//! schema.check(&mut ctx)?;
//! assert_eq!(ctx.query["page"], json!(2));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod coerce;
pub mod compose;
pub mod config;
pub mod definition;
pub mod engine;
pub mod error;
pub mod fragment;
pub mod report;
pub mod request;

// Re-export primary types.
pub use compose::{compose, CompositeSchema, StrictnessPolicy};
pub use config::{
    DiagnosticSink, NoopSink, OptionOverrides, RequestSchemaFactory, RequestSchemaOptions,
    TracingSink,
};
pub use definition::{SchemaDefinition, SchemaResolver, SchemaSource, Section};
pub use engine::{EngineOptions, JsonSchemaEngine, SchemaEngine, ValidationResult, Violation};
pub use error::{BoxError, CoercionError, ConfigurationError, EngineError, RequestError};
pub use fragment::{ObjectFragment, PrimitiveType, SchemaFragment};
pub use report::{report, ErrorPayload};
pub use request::{Outcome, RequestContext, RequestSchema};
