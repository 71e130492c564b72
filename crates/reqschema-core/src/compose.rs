//! # Schema Composition
//!
//! Turns a [`SchemaDefinition`] into the single [`CompositeSchema`] the
//! validation engine runs against. Each section is the user's fragment
//! layered over the strictness base fragment; the user's explicit fields
//! (notably `additionalProperties`) always win over the base.
//!
//! ```text
//! {
//!   "type": "object",
//!   "properties": { "body": .., "query": .., "params": .. },
//!   "required": ["body", "query", "params"],
//!   "additionalProperties": false
//! }
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::{json, Map, Value};

use crate::definition::{SchemaDefinition, Section};
use crate::fragment::ObjectFragment;

/// URI of the strict base fragment (`additionalProperties: false`).
pub const STRICT_BASE_URI: &str = "https://schemas.request-schema.dev/strict.json";
/// URI of the permissive base fragment.
pub const NOT_STRICT_BASE_URI: &str = "https://schemas.request-schema.dev/not-strict.json";

/// Whether unknown top-level fields in a section are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrictnessPolicy {
    #[default]
    Strict,
    NotStrict,
}

impl StrictnessPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            Self::Strict
        } else {
            Self::NotStrict
        }
    }

    /// The fragment every section is layered over.
    pub fn base_fragment(self) -> ObjectFragment {
        let mut keywords = Map::new();
        keywords.insert("type".into(), Value::from("object"));
        ObjectFragment {
            additional_properties: Some(Value::Bool(self == Self::NotStrict)),
            required: true,
            keywords,
            ..ObjectFragment::default()
        }
    }

    /// URI under which the engine serves this policy's base fragment.
    pub fn base_uri(self) -> &'static str {
        match self {
            Self::Strict => STRICT_BASE_URI,
            Self::NotStrict => NOT_STRICT_BASE_URI,
        }
    }

    /// Whether the engine may accept schema keywords it does not know.
    pub fn allows_unknown_attributes(self) -> bool {
        self == Self::NotStrict
    }
}

/// The merged schema for one validation call. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeSchema {
    policy: StrictnessPolicy,
    body: ObjectFragment,
    query: ObjectFragment,
    params: ObjectFragment,
    document: Value,
    compiled: CompiledDocument,
}

/// The document compiled by the engine, filled on first validation.
#[derive(Clone, Default)]
struct CompiledDocument(OnceLock<Arc<jsonschema::Validator>>);

// Derived from `document`, so it never distinguishes two composites.
impl PartialEq for CompiledDocument {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl fmt::Debug for CompiledDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompiledDocument({})", self.0.get().is_some())
    }
}

impl CompositeSchema {
    /// The merged fragment for a section.
    pub fn section(&self, section: Section) -> &ObjectFragment {
        match section {
            Section::Body => &self.body,
            Section::Query => &self.query,
            Section::Params => &self.params,
        }
    }

    /// The rendered JSON Schema document.
    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn policy(&self) -> StrictnessPolicy {
        self.policy
    }

    pub(crate) fn compiled(&self) -> Option<&jsonschema::Validator> {
        self.compiled.0.get().map(|validator| &**validator)
    }

    /// Store `validator` unless another thread got there first; either way
    /// return the stored one.
    pub(crate) fn cache_compiled(&self, validator: jsonschema::Validator) -> &jsonschema::Validator {
        self.compiled.0.get_or_init(|| Arc::new(validator))
    }
}

/// Compose a definition under a strictness policy.
pub fn compose(definition: &SchemaDefinition, policy: StrictnessPolicy) -> CompositeSchema {
    let base = policy.base_fragment();
    let merged = |section: Section| match definition.section(section) {
        Some(own) => own.layered_over(&base),
        None => base.clone(),
    };

    let body = merged(Section::Body);
    let query = merged(Section::Query);
    let params = merged(Section::Params);

    let document = json!({
        "type": "object",
        "properties": {
            "body": body.to_schema(),
            "query": query.to_schema(),
            "params": params.to_schema(),
        },
        "required": ["body", "query", "params"],
        "additionalProperties": false,
    });

    CompositeSchema {
        policy,
        body,
        query,
        params,
        document,
        compiled: CompiledDocument::default(),
    }
}
