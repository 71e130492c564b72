//! # Error Taxonomy
//!
//! Three failure classes with different owners:
//!
//! - [`ConfigurationError`]: raised while building a [`crate::RequestSchema`].
//!   Fatal; fix the schema definition or options.
//! - [`RequestError::Validation`]: the request does not match its schema.
//!   Always carries a structured [`ErrorPayload`] with status 400.
//! - Everything else in [`RequestError`] (coercion, schema resolution,
//!   engine failures) is unexpected and belongs to the host's generic
//!   error boundary.

use thiserror::Error;

use crate::report::ErrorPayload;

/// Boxed error returned by dynamic schema resolvers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Construction-time failure: the schema definition is missing or malformed.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// No schema was supplied, or it declares none of body/query/params.
    #[error("missing/invalid schema: at least one of body, query or params must be declared")]
    MissingSchema,

    /// A top-level key other than body/query/params.
    #[error("unknown schema section '{0}' (expected body, query or params)")]
    UnknownSection(String),

    /// A section that is not a JSON object.
    #[error("schema section '{section}' must be an object, found {found}")]
    InvalidSection {
        /// Section name.
        section: String,
        /// JSON type that was found instead.
        found: &'static str,
    },

    /// A fragment somewhere inside a section is malformed.
    #[error("invalid schema fragment at '{path}': {reason}")]
    InvalidFragment {
        /// Dotted path of the fragment, e.g. `query.properties.page`.
        path: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A schema definition or options file could not be read or parsed.
    #[error("cannot load '{path}': {reason}")]
    Load {
        /// File path.
        path: String,
        /// Reason the file could not be loaded.
        reason: String,
    },
}

/// A string value could not be converted to its declared type.
#[derive(Error, Debug)]
pub enum CoercionError {
    /// An `object`-typed value holds text that is not valid JSON.
    #[error("cannot coerce '{path}' to object: {source}")]
    MalformedJson {
        /// Dotted path of the value, e.g. `query.filter`.
        path: String,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
}

/// The validation engine could not run.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The composite schema failed to compile.
    #[error("schema does not compile: {reason}")]
    InvalidSchema {
        /// Compiler message.
        reason: String,
    },

    /// Strict mode found a keyword outside the JSON Schema vocabulary.
    #[error("unsupported schema attribute '{keyword}' at '{location}'")]
    UnknownKeyword {
        /// The offending keyword.
        keyword: String,
        /// JSON pointer of the schema object carrying it.
        location: String,
    },
}

/// Request-time failure produced by [`crate::RequestSchema::check`].
#[derive(Error, Debug)]
pub enum RequestError {
    /// The request failed schema validation (status 400).
    #[error("{0}")]
    Validation(ErrorPayload),

    /// A string value could not be coerced.
    #[error(transparent)]
    Coercion(#[from] CoercionError),

    /// A dynamic schema resolver failed.
    #[error("schema resolution failed: {0}")]
    Resolution(#[source] BoxError),

    /// The validation engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl RequestError {
    /// True for expected, user-input failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// HTTP status class: the payload's status for validation failures, 500 otherwise.
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(payload) => payload.status,
            _ => 500,
        }
    }

    /// The structured payload, present only for validation failures.
    pub fn payload(&self) -> Option<&ErrorPayload> {
        match self {
            Self::Validation(payload) => Some(payload),
            _ => None,
        }
    }
}
