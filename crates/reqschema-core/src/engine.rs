//! # Validation Engine
//!
//! The seam between orchestration and the JSON Schema implementation.
//! [`SchemaEngine`] takes an instance, a rendered schema and
//! [`EngineOptions`] and returns an ordered list of [`Violation`]s.
//!
//! [`JsonSchemaEngine`] is the default implementation, backed by the
//! `jsonschema` crate (Draft 2020-12, format assertions enabled).
//!
//! ## Violation Shape
//!
//! Each violation carries the path-qualified `property`
//! (`request.params.a`), a `message` (`is not one of enum values: a,b,c`)
//! and their concatenation as `stack`. Violations are grouped by section
//! in body, query, params order; order within a section is the engine's.
//!
//! ## Schema Resolution
//!
//! The strict and permissive base fragments are served locally under
//! [`STRICT_BASE_URI`](crate::compose::STRICT_BASE_URI) and
//! [`NOT_STRICT_BASE_URI`](crate::compose::NOT_STRICT_BASE_URI), so fragments may
//! `$ref` them. Any other remote reference is refused; the engine never
//! touches the network.

use std::collections::HashMap;
use std::fmt;

use jsonschema::error::ValidationErrorKind;
use jsonschema::{Retrieve, Uri, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compose::{CompositeSchema, StrictnessPolicy};
use crate::definition::Section;
use crate::error::EngineError;

/// Root name used in violation paths.
pub const REQUEST_PROPERTY: &str = "request";

/// A single schema mismatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Path of the offending value, e.g. `request.query.page`.
    pub property: String,
    /// What is wrong, without the path.
    pub message: String,
    /// `property` followed by `message`.
    pub stack: String,
    /// The schema keyword that failed.
    pub name: String,
    /// The keyword's argument (enum options, unexpected property, ...).
    pub argument: Value,
    /// JSON Pointer into the instance.
    pub instance_path: String,
    /// JSON Pointer into the schema.
    pub schema_path: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stack)
    }
}

/// Outcome of one engine call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<Violation>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Per-call engine options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Root name for violation paths.
    pub property_name: String,
    /// Strictness base in effect.
    pub base: StrictnessPolicy,
    /// Accept schema keywords outside the JSON Schema vocabulary.
    pub allow_unknown_attributes: bool,
}

impl EngineOptions {
    /// Options for validating a request under `policy`.
    pub fn for_policy(policy: StrictnessPolicy) -> Self {
        Self {
            property_name: REQUEST_PROPERTY.to_string(),
            base: policy,
            allow_unknown_attributes: policy.allows_unknown_attributes(),
        }
    }
}

/// A JSON Schema validation engine.
pub trait SchemaEngine: Send + Sync {
    /// Validate `instance` against `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the schema itself cannot be used.
    /// Instance mismatches are never errors; they are returned as violations.
    fn validate(
        &self,
        instance: &Value,
        schema: &Value,
        options: &EngineOptions,
    ) -> Result<ValidationResult, EngineError>;

    /// Validate `instance` against a composed request schema.
    ///
    /// Engines that compile schemas override this to reuse work across
    /// calls on the same composite.
    fn validate_composite(
        &self,
        instance: &Value,
        composite: &CompositeSchema,
        options: &EngineOptions,
    ) -> Result<ValidationResult, EngineError> {
        self.validate(instance, composite.document(), options)
    }
}

/// Resolves `$ref`s to the base fragments without network access.
struct BaseSchemaRetriever {
    schemas_by_uri: HashMap<String, Value>,
}

impl Retrieve for BaseSchemaRetriever {
    fn retrieve(
        &self,
        uri: &Uri<&str>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let uri_str = uri.as_str();
        self.schemas_by_uri
            .get(uri_str)
            .cloned()
            .ok_or_else(|| format!("unresolvable schema reference '{uri_str}'").into())
    }
}

/// Default engine backed by the `jsonschema` crate.
#[derive(Debug, Clone)]
pub struct JsonSchemaEngine {
    base_schemas: HashMap<String, Value>,
}

impl JsonSchemaEngine {
    /// Create an engine with both base fragments registered.
    pub fn new() -> Self {
        let base_schemas = [StrictnessPolicy::Strict, StrictnessPolicy::NotStrict]
            .into_iter()
            .map(|policy| {
                let mut schema = policy.base_fragment().to_schema();
                if let Value::Object(map) = &mut schema {
                    map.insert("$id".into(), Value::from(policy.base_uri()));
                }
                (policy.base_uri().to_string(), schema)
            })
            .collect();
        Self { base_schemas }
    }

    fn compile(&self, schema: &Value) -> Result<jsonschema::Validator, EngineError> {
        jsonschema::options()
            .with_draft(jsonschema::Draft::Draft202012)
            .should_validate_formats(true)
            .with_retriever(BaseSchemaRetriever {
                schemas_by_uri: self.base_schemas.clone(),
            })
            .build(schema)
            .map_err(|e| EngineError::InvalidSchema {
                reason: e.to_string(),
            })
    }
}

impl Default for JsonSchemaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaEngine for JsonSchemaEngine {
    fn validate(
        &self,
        instance: &Value,
        schema: &Value,
        options: &EngineOptions,
    ) -> Result<ValidationResult, EngineError> {
        audit_keywords(schema, options)?;
        let validator = self.compile(schema)?;
        Ok(run_validator(&validator, instance, schema, options))
    }

    fn validate_composite(
        &self,
        instance: &Value,
        composite: &CompositeSchema,
        options: &EngineOptions,
    ) -> Result<ValidationResult, EngineError> {
        let schema = composite.document();
        audit_keywords(schema, options)?;
        let validator = match composite.compiled() {
            Some(validator) => validator,
            None => composite.cache_compiled(self.compile(schema)?),
        };
        Ok(run_validator(validator, instance, schema, options))
    }
}

fn audit_keywords(schema: &Value, options: &EngineOptions) -> Result<(), EngineError> {
    if options.allow_unknown_attributes {
        return Ok(());
    }
    match find_unknown_keyword(schema, "#") {
        Some((keyword, location)) => Err(EngineError::UnknownKeyword { keyword, location }),
        None => Ok(()),
    }
}

fn run_validator(
    validator: &jsonschema::Validator,
    instance: &Value,
    schema: &Value,
    options: &EngineOptions,
) -> ValidationResult {
    let mut errors: Vec<Violation> = validator
        .iter_errors(instance)
        .flat_map(|e| to_violations(&e, instance, schema, &options.property_name))
        .collect();
    errors.sort_by_key(|v| section_rank(&v.instance_path));

    tracing::trace!(
        base = options.base.base_uri(),
        violations = errors.len(),
        "validated request instance"
    );
    ValidationResult { errors }
}

fn to_violations(
    error: &ValidationError<'_>,
    instance: &Value,
    schema: &Value,
    root: &str,
) -> Vec<Violation> {
    let instance_path = error.instance_path.to_string();
    let schema_path = error.schema_path.to_string();
    let property = property_path(root, &instance_path, instance);
    let keyword = schema_path.rsplit('/').next().unwrap_or_default().to_string();

    let violation = |message: String, name: &str, argument: Value| Violation {
        stack: format!("{property} {message}"),
        property: property.clone(),
        message,
        name: name.to_string(),
        argument,
        instance_path: instance_path.clone(),
        schema_path: schema_path.clone(),
    };

    match &error.kind {
        ValidationErrorKind::AdditionalProperties { unexpected } => unexpected
            .iter()
            .map(|name| {
                violation(
                    format!("additionalProperty {} exists in instance when not allowed", quote(name)),
                    "additionalProperties",
                    Value::from(name.as_str()),
                )
            })
            .collect(),
        ValidationErrorKind::Required { property: missing } => {
            let name = missing.as_str().map_or_else(|| missing.to_string(), quote);
            vec![violation(
                format!("requires property {name}"),
                "required",
                missing.clone(),
            )]
        }
        _ => {
            let argument = schema.pointer(&schema_path).cloned().unwrap_or(Value::Null);
            let message = describe(&keyword, &argument).unwrap_or_else(|| error.to_string());
            vec![violation(message, &keyword, argument)]
        }
    }
}

/// Contract wording for keyword failures whose argument is known.
fn describe(keyword: &str, argument: &Value) -> Option<String> {
    let message = match (keyword, argument) {
        ("enum", Value::Array(options)) => format!(
            "is not one of enum values: {}",
            options.iter().map(plain_text).collect::<Vec<_>>().join(",")
        ),
        ("type", Value::String(name)) => format!("is not of a type(s) {name}"),
        ("type", Value::Array(names)) => format!(
            "is not of a type(s) {}",
            names.iter().map(plain_text).collect::<Vec<_>>().join(",")
        ),
        ("format", Value::String(format)) => format!("does not conform to the {} format", quote(format)),
        ("pattern", Value::String(pattern)) => format!("does not match pattern {}", quote(pattern)),
        ("minLength" | "minItems", Value::Number(n)) => format!("does not meet minimum length of {n}"),
        ("maxLength" | "maxItems", Value::Number(n)) => format!("does not meet maximum length of {n}"),
        ("minProperties", Value::Number(n)) => format!("does not meet minimum property length of {n}"),
        ("maxProperties", Value::Number(n)) => format!("does not meet maximum property length of {n}"),
        ("minimum", Value::Number(n)) => format!("must be greater than or equal to {n}"),
        ("maximum", Value::Number(n)) => format!("must be less than or equal to {n}"),
        ("exclusiveMinimum", Value::Number(n)) => format!("must be greater than {n}"),
        ("exclusiveMaximum", Value::Number(n)) => format!("must be less than {n}"),
        ("multipleOf", Value::Number(n)) => format!("is not a multiple of (divisible by) {n}"),
        ("const", expected) => format!("does not exactly match expected constant: {}", plain_text(expected)),
        ("uniqueItems", _) => "contains duplicate item".to_string(),
        _ => return None,
    };
    Some(message)
}

/// Render an instance JSON Pointer as `root.a[0]["x-y"]`.
fn property_path(root: &str, pointer: &str, instance: &Value) -> String {
    let mut path = root.to_string();
    let mut current = Some(instance);
    for raw in pointer.split('/').skip(1) {
        let segment = raw.replace("~1", "/").replace("~0", "~");
        let index = match current {
            Some(Value::Array(_)) => segment.parse::<usize>().ok(),
            _ => None,
        };
        match index {
            Some(i) => path.push_str(&format!("[{i}]")),
            None if is_identifier(&segment) => {
                path.push('.');
                path.push_str(&segment);
            }
            None => path.push_str(&format!("[{}]", quote(&segment))),
        }
        current = match (current, index) {
            (Some(Value::Array(items)), Some(i)) => items.get(i),
            (Some(Value::Object(fields)), _) => fields.get(&segment),
            _ => None,
        };
    }
    path
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

fn section_rank(instance_path: &str) -> usize {
    instance_path
        .split('/')
        .nth(1)
        .and_then(Section::from_name)
        .and_then(|section| Section::ALL.iter().position(|s| *s == section))
        .unwrap_or(Section::ALL.len())
}

fn quote(text: &str) -> String {
    Value::from(text).to_string()
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// JSON Schema keywords (Draft 4 through 2020-12) plus standard annotations.
const KNOWN_KEYWORDS: &[&str] = &[
    "$schema", "$id", "id", "$ref", "$defs", "definitions", "$anchor", "$dynamicRef",
    "$dynamicAnchor", "$recursiveRef", "$recursiveAnchor", "$comment", "$vocabulary",
    "type", "enum", "const",
    "multipleOf", "maximum", "exclusiveMaximum", "minimum", "exclusiveMinimum",
    "maxLength", "minLength", "pattern", "format",
    "items", "prefixItems", "additionalItems", "contains", "minContains", "maxContains",
    "maxItems", "minItems", "uniqueItems", "unevaluatedItems",
    "properties", "patternProperties", "additionalProperties", "propertyNames", "required",
    "dependentRequired", "dependentSchemas", "dependencies", "maxProperties", "minProperties",
    "unevaluatedProperties",
    "allOf", "anyOf", "oneOf", "not", "if", "then", "else",
    "title", "description", "default", "examples", "readOnly", "writeOnly", "deprecated",
    "contentEncoding", "contentMediaType", "contentSchema",
];

/// First keyword outside [`KNOWN_KEYWORDS`], with the pointer of its schema object.
fn find_unknown_keyword(schema: &Value, location: &str) -> Option<(String, String)> {
    let Value::Object(map) = schema else {
        return None;
    };
    for (key, value) in map {
        if !KNOWN_KEYWORDS.contains(&key.as_str()) {
            return Some((key.clone(), location.to_string()));
        }
        let here = format!("{location}/{}", escape_pointer(key));
        let found = match key.as_str() {
            "properties" | "patternProperties" | "$defs" | "definitions" | "dependentSchemas"
            | "dependencies" => value.as_object().and_then(|named| {
                named.iter().find_map(|(name, sub)| {
                    find_unknown_keyword(sub, &format!("{here}/{}", escape_pointer(name)))
                })
            }),
            "items" | "prefixItems" | "allOf" | "anyOf" | "oneOf" => match value {
                Value::Array(subs) => subs
                    .iter()
                    .enumerate()
                    .find_map(|(i, sub)| find_unknown_keyword(sub, &format!("{here}/{i}"))),
                other => find_unknown_keyword(other, &here),
            },
            "additionalProperties" | "additionalItems" | "not" | "if" | "then" | "else"
            | "contains" | "propertyNames" | "unevaluatedProperties" | "unevaluatedItems"
            | "contentSchema" => find_unknown_keyword(value, &here),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
