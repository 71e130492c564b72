//! # Options
//!
//! Construction-time configuration of a [`RequestSchema`]:
//!
//! | Option          | Default                                   |
//! |-----------------|-------------------------------------------|
//! | `validator`     | [`JsonSchemaEngine`]                      |
//! | `coerceTypes`   | `true`                                    |
//! | `strict`        | `true`                                    |
//! | `displayErrors` | derived from the request's environment tag |
//! | `warn`          | [`TracingSink`]                           |
//!
//! [`OptionOverrides`] carries a partial set of options. It is what config
//! files deserialize into and what [`RequestSchemaFactory`] merges: per-call
//! overrides win over the factory's defaults, which win over the built-in
//! defaults.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::compose::StrictnessPolicy;
use crate::definition::SchemaSource;
use crate::engine::{JsonSchemaEngine, SchemaEngine};
use crate::error::ConfigurationError;
use crate::report::displays_errors_in;
use crate::request::RequestSchema;

/// Receives non-fatal diagnostics such as lossy conversions.
pub trait DiagnosticSink: Send + Sync {
    fn warn(&self, message: &str);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn warn(&self, message: &str) {
        self(message)
    }
}

/// Forwards diagnostics to `tracing::warn!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn warn(&self, message: &str) {
        tracing::warn!(target: "reqschema", "{message}");
    }
}

/// Discards diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn warn(&self, _message: &str) {}
}

/// Fully resolved options.
#[derive(Clone)]
pub struct RequestSchemaOptions {
    /// Validation engine.
    pub validator: Arc<dyn SchemaEngine>,
    /// Convert string inputs to their declared types before validating.
    pub coerce_types: bool,
    /// Reject unknown top-level fields in each section.
    pub strict: bool,
    /// Include violations in error payloads. `None` derives the choice
    /// from the request's environment tag.
    pub display_errors: Option<bool>,
    /// Diagnostic sink.
    pub warn: Arc<dyn DiagnosticSink>,
}

impl RequestSchemaOptions {
    pub fn policy(&self) -> StrictnessPolicy {
        StrictnessPolicy::from_strict(self.strict)
    }

    /// Whether violations are displayed for a request in `environment`.
    pub fn displays_errors(&self, environment: Option<&str>) -> bool {
        self.display_errors
            .unwrap_or_else(|| displays_errors_in(environment))
    }
}

impl Default for RequestSchemaOptions {
    fn default() -> Self {
        Self {
            validator: Arc::new(JsonSchemaEngine::new()),
            coerce_types: true,
            strict: true,
            display_errors: None,
            warn: Arc::new(TracingSink),
        }
    }
}

impl fmt::Debug for RequestSchemaOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSchemaOptions")
            .field("validator", &"<engine>")
            .field("coerce_types", &self.coerce_types)
            .field("strict", &self.strict)
            .field("display_errors", &self.display_errors)
            .field("warn", &"<sink>")
            .finish()
    }
}

/// A partial set of options.
///
/// Deserializes from YAML or JSON with camelCase keys; unknown keys are
/// rejected. `validator` and `warn` can only be set in code.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OptionOverrides {
    #[serde(skip)]
    pub validator: Option<Arc<dyn SchemaEngine>>,
    pub coerce_types: Option<bool>,
    pub strict: Option<bool>,
    pub display_errors: Option<bool>,
    #[serde(skip)]
    pub warn: Option<Arc<dyn DiagnosticSink>>,
}

impl OptionOverrides {
    /// Parse overrides from YAML (or JSON) text.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigurationError> {
        serde_yaml::from_str(text).map_err(|e| ConfigurationError::Load {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })
    }

    /// Read overrides from a YAML or JSON file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigurationError> {
        let load_error = |reason: String| ConfigurationError::Load {
            path: path.display().to_string(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        serde_yaml::from_str(&text).map_err(|e| load_error(e.to_string()))
    }

    pub fn with_validator(mut self, validator: Arc<dyn SchemaEngine>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_warn(mut self, warn: Arc<dyn DiagnosticSink>) -> Self {
        self.warn = Some(warn);
        self
    }

    pub fn with_coerce_types(mut self, coerce_types: bool) -> Self {
        self.coerce_types = Some(coerce_types);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    pub fn with_display_errors(mut self, display_errors: bool) -> Self {
        self.display_errors = Some(display_errors);
        self
    }

    /// Fill every option this set leaves open from `base`.
    pub fn merged_over(self, base: &OptionOverrides) -> OptionOverrides {
        OptionOverrides {
            validator: self.validator.or_else(|| base.validator.clone()),
            coerce_types: self.coerce_types.or(base.coerce_types),
            strict: self.strict.or(base.strict),
            display_errors: self.display_errors.or(base.display_errors),
            warn: self.warn.or_else(|| base.warn.clone()),
        }
    }

    /// Apply over the built-in defaults.
    pub fn resolve(self) -> RequestSchemaOptions {
        let defaults = RequestSchemaOptions::default();
        RequestSchemaOptions {
            validator: self.validator.unwrap_or(defaults.validator),
            coerce_types: self.coerce_types.unwrap_or(defaults.coerce_types),
            strict: self.strict.unwrap_or(defaults.strict),
            display_errors: self.display_errors.or(defaults.display_errors),
            warn: self.warn.unwrap_or(defaults.warn),
        }
    }
}

impl fmt::Debug for OptionOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionOverrides")
            .field("validator", &self.validator.as_ref().map(|_| "<engine>"))
            .field("coerce_types", &self.coerce_types)
            .field("strict", &self.strict)
            .field("display_errors", &self.display_errors)
            .field("warn", &self.warn.as_ref().map(|_| "<sink>"))
            .finish()
    }
}

/// Builds [`RequestSchema`]s pre-bound to a set of default options.
#[derive(Debug, Clone, Default)]
pub struct RequestSchemaFactory {
    defaults: OptionOverrides,
}

impl RequestSchemaFactory {
    pub fn new(defaults: OptionOverrides) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &OptionOverrides {
        &self.defaults
    }

    /// The options a [`build`](Self::build) call with `overrides` would use.
    pub fn options(&self, overrides: OptionOverrides) -> RequestSchemaOptions {
        overrides.merged_over(&self.defaults).resolve()
    }

    /// Build a middleware instance; `overrides` win over the factory defaults.
    pub fn build(
        &self,
        source: impl Into<SchemaSource>,
        overrides: OptionOverrides,
    ) -> Result<RequestSchema, ConfigurationError> {
        RequestSchema::new(source, self.options(overrides))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::SchemaDefinition;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn built_in_defaults() {
        let options = RequestSchemaOptions::default();
        assert!(options.coerce_types);
        assert!(options.strict);
        assert_eq!(options.display_errors, None);
        assert_eq!(options.policy(), StrictnessPolicy::Strict);
        assert!(options.displays_errors(Some("development")));
        assert!(!options.displays_errors(Some("production")));
        assert!(!options.displays_errors(None));
    }

    #[test]
    fn explicit_display_errors_ignores_environment() {
        let options = OptionOverrides::default().with_display_errors(false).resolve();
        assert!(!options.displays_errors(Some("development")));
        let options = OptionOverrides::default().with_display_errors(true).resolve();
        assert!(options.displays_errors(Some("production")));
    }

    #[test]
    fn overrides_win_over_defaults() {
        let defaults = OptionOverrides::default()
            .with_strict(false)
            .with_coerce_types(false);
        let merged = OptionOverrides::default()
            .with_coerce_types(true)
            .merged_over(&defaults)
            .resolve();
        assert!(!merged.strict);
        assert!(merged.coerce_types);
    }

    #[test]
    fn overrides_deserialize_from_yaml() {
        let overrides = OptionOverrides::from_yaml_str(
            "coerceTypes: false\nstrict: false\ndisplayErrors: true\n",
        )
        .unwrap();
        assert_eq!(overrides.coerce_types, Some(false));
        assert_eq!(overrides.strict, Some(false));
        assert_eq!(overrides.display_errors, Some(true));
        assert!(overrides.validator.is_none());
    }

    #[test]
    fn overrides_reject_unknown_keys() {
        let err = OptionOverrides::from_yaml_str("strcit: false\n").unwrap_err();
        assert!(matches!(err, ConfigurationError::Load { .. }));
    }

    #[test]
    fn overrides_load_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{ "strict": false }"#).unwrap();
        let overrides = OptionOverrides::from_path(&path).unwrap();
        assert_eq!(overrides.strict, Some(false));

        let missing = OptionOverrides::from_path(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(missing.to_string().contains("absent.yaml"));
    }

    #[test]
    fn closures_are_diagnostic_sinks() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let collector = Arc::clone(&seen);
        let sink: Arc<dyn DiagnosticSink> = Arc::new(move |message: &str| {
            collector.lock().unwrap().push(message.to_string());
        });
        sink.warn("query.page: lossy");
        NoopSink.warn("dropped");
        assert_eq!(*seen.lock().unwrap(), vec!["query.page: lossy".to_string()]);
    }

    #[test]
    fn factory_binds_defaults() {
        let factory = RequestSchemaFactory::new(OptionOverrides::default().with_strict(false));
        let definition =
            SchemaDefinition::from_value(json!({ "query": { "properties": {} } })).unwrap();

        let permissive = factory
            .build(definition.clone(), OptionOverrides::default())
            .unwrap();
        assert_eq!(permissive.policy(), StrictnessPolicy::NotStrict);

        let strict = factory
            .build(definition, OptionOverrides::default().with_strict(true))
            .unwrap();
        assert_eq!(strict.policy(), StrictnessPolicy::Strict);
        assert_eq!(factory.defaults().strict, Some(false));
    }

    #[test]
    fn factory_rejects_empty_definitions() {
        let factory = RequestSchemaFactory::default();
        let err = factory
            .build(SchemaDefinition::default(), OptionOverrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingSchema));
    }
}
