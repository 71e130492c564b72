//! # Validation Orchestrator
//!
//! [`RequestSchema`] is the framework-agnostic middleware. For each request
//! it runs:
//!
//! ```text
//! resolve schema ─▶ coerce (optional) ─▶ validate ─▶ Validated
//!       │                                    └─────▶ RequestError::Validation
//!       └─▶ Skipped (dynamic resolver declined)
//! ```
//!
//! Static definitions are composed once per instance and shared by every
//! request. Dynamic definitions are resolved and composed per request.
//!
//! Coercion and resolution failures are returned as their own
//! [`RequestError`] variants and are never turned into a validation payload.

use std::sync::{Arc, OnceLock};

use serde_json::{json, Map, Value};

use crate::coerce::{coerce_fields, LossyConversion};
use crate::compose::{compose, CompositeSchema, StrictnessPolicy};
use crate::config::RequestSchemaOptions;
use crate::definition::{SchemaSource, Section};
use crate::engine::EngineOptions;
use crate::error::{ConfigurationError, RequestError};
use crate::report::report;

/// The mutable view of a request the orchestrator works on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    /// Parsed body; `Value::Null` when the request has none.
    pub body: Value,
    pub query: Map<String, Value>,
    pub params: Map<String, Value>,
    /// Deployment environment tag (`development`, `production`, ...).
    pub environment: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        self.query = query;
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// The instance handed to the engine.
    fn instance(&self) -> Value {
        let body = if self.body.is_null() {
            Value::Object(Map::new())
        } else {
            self.body.clone()
        };
        json!({
            "body": body,
            "query": self.query,
            "params": self.params,
        })
    }
}

/// How a request passed the middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The request matched its schema.
    Validated,
    /// The dynamic resolver declined to provide a schema for this request.
    Skipped,
}

/// A configured validation middleware instance.
pub struct RequestSchema {
    source: SchemaSource,
    options: RequestSchemaOptions,
    composite: OnceLock<Arc<CompositeSchema>>,
}

impl RequestSchema {
    /// Create a middleware instance.
    ///
    /// # Errors
    ///
    /// `ConfigurationError::MissingSchema` for a static definition that
    /// declares no section.
    pub fn new(
        source: impl Into<SchemaSource>,
        options: RequestSchemaOptions,
    ) -> Result<Self, ConfigurationError> {
        let source = source.into();
        if let SchemaSource::Static(definition) = &source {
            if definition.is_empty() {
                return Err(ConfigurationError::MissingSchema);
            }
        }
        Ok(Self {
            source,
            options,
            composite: OnceLock::new(),
        })
    }

    /// Create an instance with the built-in default options.
    pub fn with_defaults(source: impl Into<SchemaSource>) -> Result<Self, ConfigurationError> {
        Self::new(source, RequestSchemaOptions::default())
    }

    pub fn options(&self) -> &RequestSchemaOptions {
        &self.options
    }

    pub fn policy(&self) -> StrictnessPolicy {
        self.options.policy()
    }

    /// The composite schema that applies to `ctx`, or `None` when a dynamic
    /// resolver returns no definition (or an empty one).
    pub fn composite_for(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<Arc<CompositeSchema>>, RequestError> {
        match &self.source {
            SchemaSource::Static(definition) => {
                let composite = self
                    .composite
                    .get_or_init(|| Arc::new(compose(definition, self.policy())));
                Ok(Some(Arc::clone(composite)))
            }
            SchemaSource::Dynamic(resolver) => {
                let resolved = (**resolver)(ctx).map_err(RequestError::Resolution)?;
                Ok(resolved
                    .filter(|definition| !definition.is_empty())
                    .map(|definition| Arc::new(compose(&definition, self.policy()))))
            }
        }
    }

    /// Run the pipeline against `ctx`, coercing it in place.
    ///
    /// # Errors
    ///
    /// - `RequestError::Validation` when the request does not match.
    /// - `RequestError::Resolution` when a dynamic resolver fails.
    /// - `RequestError::Coercion` for malformed JSON in an `object` field.
    /// - `RequestError::Engine` when the schema cannot be used.
    pub fn check(&self, ctx: &mut RequestContext) -> Result<Outcome, RequestError> {
        let Some(composite) = self.composite_for(ctx)? else {
            tracing::debug!("no schema for request, skipping validation");
            return Ok(Outcome::Skipped);
        };

        if self.options.coerce_types {
            let lossy = coerce_request(ctx, &composite)?;
            for conversion in &lossy {
                self.options.warn.warn(&lossy_message(conversion));
            }
        }

        let result = self.options.validator.validate_composite(
            &ctx.instance(),
            &composite,
            &EngineOptions::for_policy(composite.policy()),
        )?;

        if result.is_valid() {
            tracing::debug!("request passed validation");
            return Ok(Outcome::Validated);
        }

        tracing::debug!(violations = result.errors.len(), "request failed validation");
        let display = self.options.displays_errors(ctx.environment.as_deref());
        Err(RequestError::Validation(report(result, display)))
    }
}

impl std::fmt::Debug for RequestSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSchema")
            .field("source", &self.source)
            .field("options", &self.options)
            .field("composed", &self.composite.get().is_some())
            .finish()
    }
}

/// Coerce params and body in place, and query through a copy merged back
/// key by key.
fn coerce_request(
    ctx: &mut RequestContext,
    composite: &CompositeSchema,
) -> Result<Vec<LossyConversion>, RequestError> {
    let section = |s: Section| (composite.section(s), s.coercion_targets(), s.name());

    let (fragment, targets, name) = section(Section::Params);
    let mut lossy = coerce_fields(&mut ctx.params, fragment, targets, name)?;

    if let Value::Object(body) = &mut ctx.body {
        let (fragment, targets, name) = section(Section::Body);
        lossy.extend(coerce_fields(body, fragment, targets, name)?);
    }

    let (fragment, targets, name) = section(Section::Query);
    let mut query = ctx.query.clone();
    lossy.extend(coerce_fields(&mut query, fragment, targets, name)?);
    for (key, value) in query {
        ctx.query.insert(key, value);
    }

    Ok(lossy)
}

fn lossy_message(conversion: &LossyConversion) -> String {
    format!(
        "{}: {:?} does not convert to {}",
        conversion.path, conversion.input, conversion.target
    )
}
