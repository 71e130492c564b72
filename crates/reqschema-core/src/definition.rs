//! # Schema Definitions
//!
//! A [`SchemaDefinition`] is what a route declares: up to three object
//! fragments, one per request section. Definitions are immutable once
//! built and are either supplied directly ([`SchemaSource::Static`]) or
//! computed per request ([`SchemaSource::Dynamic`]).
//!
//! Definitions can be loaded from JSON or YAML files. YAML is converted to
//! the JSON value tree before parsing, so both formats share one dialect.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::coerce::CoercionTargets;
use crate::error::{BoxError, ConfigurationError};
use crate::fragment::{json_type, ObjectFragment, PrimitiveType};
use crate::request::RequestContext;

/// One of the three validated parts of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Body,
    Query,
    Params,
}

impl Section {
    /// All sections in canonical order. Violations are reported in this order.
    pub const ALL: [Section; 3] = [Section::Body, Section::Query, Section::Params];

    /// The section's key in definitions and in the validated instance.
    pub fn name(self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Query => "query",
            Self::Params => "params",
        }
    }

    /// Parse a section key.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|section| section.name() == name)
    }

    /// Types eligible for string coercion in this section.
    ///
    /// Query and path parameters always arrive as strings, so every
    /// convertible type is eligible. A parsed JSON body already carries
    /// native numbers, booleans and objects; only dates are converted there.
    pub fn coercion_targets(self) -> CoercionTargets {
        match self {
            Self::Query | Self::Params => CoercionTargets::Any,
            Self::Body => CoercionTargets::Only(&[PrimitiveType::Date]),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The user-declared schema for one route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDefinition {
    pub body: Option<ObjectFragment>,
    pub query: Option<ObjectFragment>,
    pub params: Option<ObjectFragment>,
}

impl SchemaDefinition {
    /// Parse a definition from `{ "body": ..., "query": ..., "params": ... }`.
    ///
    /// # Errors
    ///
    /// - `MissingSchema` if the value is `null` or declares no section.
    /// - `UnknownSection` for any other top-level key.
    /// - `InvalidSection` / `InvalidFragment` for malformed sections.
    pub fn from_value(value: Value) -> Result<Self, ConfigurationError> {
        let map = match value {
            Value::Null => return Err(ConfigurationError::MissingSchema),
            Value::Object(map) => map,
            other => {
                return Err(ConfigurationError::InvalidSection {
                    section: "(root)".to_string(),
                    found: json_type(&other),
                })
            }
        };

        let mut definition = Self::default();
        for (key, fragment) in map {
            let section = Section::from_name(&key)
                .ok_or_else(|| ConfigurationError::UnknownSection(key.clone()))?;
            if fragment.is_null() {
                continue;
            }
            if !fragment.is_object() {
                return Err(ConfigurationError::InvalidSection {
                    section: key,
                    found: json_type(&fragment),
                });
            }
            let parsed = ObjectFragment::from_value(fragment, section.name())?;
            *definition.slot_mut(section) = Some(parsed);
        }

        if definition.is_empty() {
            return Err(ConfigurationError::MissingSchema);
        }
        Ok(definition)
    }

    /// Parse a definition from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigurationError> {
        let value: Value = serde_json::from_str(text).map_err(|e| ConfigurationError::Load {
            path: "(inline)".to_string(),
            reason: format!("invalid JSON: {e}"),
        })?;
        Self::from_value(value)
    }

    /// Parse a definition from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigurationError> {
        let value = parse_yaml(text).map_err(|reason| ConfigurationError::Load {
            path: "(inline)".to_string(),
            reason,
        })?;
        Self::from_value(value)
    }

    /// Load a definition file. `.yaml`/`.yml` files are read as YAML,
    /// everything else as JSON.
    pub fn from_path(path: &Path) -> Result<Self, ConfigurationError> {
        let value = load_document(path)?;
        Self::from_value(value)
    }

    /// The fragment declared for a section.
    pub fn section(&self, section: Section) -> Option<&ObjectFragment> {
        match section {
            Section::Body => self.body.as_ref(),
            Section::Query => self.query.as_ref(),
            Section::Params => self.params.as_ref(),
        }
    }

    fn slot_mut(&mut self, section: Section) -> &mut Option<ObjectFragment> {
        match section {
            Section::Body => &mut self.body,
            Section::Query => &mut self.query,
            Section::Params => &mut self.params,
        }
    }

    /// True when no section is declared.
    pub fn is_empty(&self) -> bool {
        self.body.is_none() && self.query.is_none() && self.params.is_none()
    }
}

/// Per-request schema resolver.
pub type SchemaResolver =
    Arc<dyn Fn(&RequestContext) -> Result<Option<SchemaDefinition>, BoxError> + Send + Sync>;

/// Where a route's schema comes from.
#[derive(Clone)]
pub enum SchemaSource {
    /// Fixed for the lifetime of the middleware; composed once.
    Static(SchemaDefinition),
    /// Computed from the in-flight request; composed on every request.
    /// Returning `None` (or an empty definition) skips validation.
    Dynamic(SchemaResolver),
}

impl SchemaSource {
    /// Wrap a resolver closure.
    pub fn dynamic<F>(resolver: F) -> Self
    where
        F: Fn(&RequestContext) -> Result<Option<SchemaDefinition>, BoxError> + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(resolver))
    }
}

impl From<SchemaDefinition> for SchemaSource {
    fn from(definition: SchemaDefinition) -> Self {
        Self::Static(definition)
    }
}

impl fmt::Debug for SchemaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(definition) => f.debug_tuple("Static").field(definition).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Read a JSON or YAML document into a JSON value.
pub(crate) fn load_document(path: &Path) -> Result<Value, ConfigurationError> {
    let load_error = |reason: String| ConfigurationError::Load {
        path: path.display().to_string(),
        reason,
    };

    let content =
        std::fs::read_to_string(path).map_err(|e| load_error(format!("cannot read file: {e}")))?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yaml" | "yml" => parse_yaml(&content).map_err(load_error),
        _ => serde_json::from_str(&content).map_err(|e| load_error(format!("invalid JSON: {e}"))),
    }
}

fn parse_yaml(text: &str) -> Result<Value, String> {
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| format!("invalid YAML: {e}"))?;
    yaml_to_json_value(&yaml).map_err(|e| format!("YAML-to-JSON conversion failed: {e}"))
}

/// Convert a `serde_yaml::Value` to a `serde_json::Value`.
///
/// Schema files only use the JSON-compatible subset of YAML; tags are
/// dropped and scalar map keys are stringified.
fn yaml_to_json_value(yaml: &serde_yaml::Value) -> Result<Value, String> {
    match yaml {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::from(i))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::from(u))
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| format!("cannot represent float {f} in JSON"))
            } else {
                Err(format!("unsupported YAML number: {n:?}"))
            }
        }
        serde_yaml::Value::String(s) => Ok(Value::String(s.clone())),
        serde_yaml::Value::Sequence(seq) => seq
            .iter()
            .map(yaml_to_json_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        serde_yaml::Value::Mapping(map) => {
            let mut json_map = serde_json::Map::new();
            for (k, v) in map {
                let key = match k {
                    serde_yaml::Value::String(s) => s.clone(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    other => return Err(format!("unsupported YAML map key type: {other:?}")),
                };
                json_map.insert(key, yaml_to_json_value(v)?);
            }
            Ok(Value::Object(json_map))
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json_value(&tagged.value),
    }
}
