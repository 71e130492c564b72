//! # Schema Fragments
//!
//! Typed view of the schema dialect authors write for body, query and
//! params. A fragment is parsed once from JSON and then pattern-matched by
//! the composer and the coercion engine.
//!
//! ## Dialect
//!
//! Fragments are JSON Schema with two authoring conveniences:
//!
//! - `"required": true` on a property marks it required in its parent
//!   (the parent's `required` array is generated on render).
//! - `"type": "date"` declares a date value. It renders as a
//!   `date-time` formatted string, which is what date coercion produces.
//!
//! Everything else is carried through to the rendered schema untouched.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::ConfigurationError;

/// Type names a fragment can declare with a plain string `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Null,
    Date,
}

impl PrimitiveType {
    /// Parse a declared `type` name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            "null" => Some(Self::Null),
            "date" => Some(Self::Date),
            _ => None,
        }
    }

    /// The declared name of this type.
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Null => "null",
            Self::Date => "date",
        }
    }

    /// Whether a string value can be converted to this type.
    pub fn is_convertible(self) -> bool {
        matches!(
            self,
            Self::Date | Self::Integer | Self::Number | Self::Boolean | Self::Object
        )
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One node of a schema tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaFragment {
    /// A scalar, array or date declared with a single known `type`.
    Primitive {
        kind: PrimitiveType,
        required: bool,
        enumeration: Option<Vec<Value>>,
        /// Remaining keywords (`minimum`, `pattern`, `items`, ...).
        keywords: Map<String, Value>,
    },
    /// An object with (optional) named properties.
    Object(ObjectFragment),
    /// Anything else (`anyOf`, type unions, `$ref`, boolean schemas).
    Passthrough { required: bool, schema: Value },
}

/// An object-shaped fragment. Every body/query/params section is one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectFragment {
    /// Declared properties in declaration order.
    pub properties: Option<Vec<(String, SchemaFragment)>>,
    pub additional_properties: Option<Value>,
    /// Names listed in an explicit `required` array.
    pub required_names: Vec<String>,
    /// `"required": true` on this fragment itself.
    pub required: bool,
    /// Remaining keywords, including `type`.
    pub keywords: Map<String, Value>,
}

impl SchemaFragment {
    /// Parse a fragment from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidFragment` for values that are not
    /// schemas, non-object `properties`, non-array `enum`, or a `required`
    /// that is neither a boolean nor an array of names.
    pub fn from_value(value: Value) -> Result<Self, ConfigurationError> {
        Self::parse(value, "$")
    }

    pub(crate) fn parse(value: Value, path: &str) -> Result<Self, ConfigurationError> {
        let mut map = match value {
            Value::Object(map) => map,
            Value::Bool(_) => {
                return Ok(Self::Passthrough {
                    required: false,
                    schema: value,
                })
            }
            other => {
                return Err(invalid(
                    path,
                    format!("expected a schema object, found {}", json_type(&other)),
                ))
            }
        };

        let required = take_required_flag(&mut map, path)?;
        let declared = map
            .get("type")
            .and_then(Value::as_str)
            .and_then(PrimitiveType::from_name);

        if map.contains_key("properties") || declared == Some(PrimitiveType::Object) {
            return ObjectFragment::from_map(map, required, path).map(Self::Object);
        }

        match declared {
            Some(kind) => {
                map.remove("type");
                let enumeration = match map.remove("enum") {
                    None => None,
                    Some(Value::Array(values)) => Some(values),
                    Some(other) => {
                        return Err(invalid(
                            path,
                            format!("'enum' must be an array, found {}", json_type(&other)),
                        ))
                    }
                };
                Ok(Self::Primitive {
                    kind,
                    required,
                    enumeration,
                    keywords: map,
                })
            }
            None => Ok(Self::Passthrough {
                required,
                schema: Value::Object(map),
            }),
        }
    }

    /// Whether the parent must list this property as required.
    pub fn is_required(&self) -> bool {
        match self {
            Self::Primitive { required, .. } | Self::Passthrough { required, .. } => *required,
            Self::Object(object) => object.required,
        }
    }

    /// The single declared type, if any.
    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        match self {
            Self::Primitive { kind, .. } => Some(*kind),
            Self::Object(object) => object.declared_type(),
            Self::Passthrough { .. } => None,
        }
    }

    /// Render as a Draft 2020-12 JSON Schema value.
    pub fn to_schema(&self) -> Value {
        match self {
            Self::Primitive {
                kind,
                enumeration,
                keywords,
                ..
            } => {
                let mut schema = Map::new();
                match kind {
                    PrimitiveType::Date => {
                        schema.insert("type".into(), Value::from("string"));
                        schema.insert("format".into(), Value::from("date-time"));
                    }
                    other => {
                        schema.insert("type".into(), Value::from(other.name()));
                    }
                }
                if let Some(values) = enumeration {
                    schema.insert("enum".into(), Value::Array(values.clone()));
                }
                schema.extend(keywords.clone());
                Value::Object(schema)
            }
            Self::Object(object) => object.to_schema(),
            Self::Passthrough { schema, .. } => schema.clone(),
        }
    }
}

impl ObjectFragment {
    /// Parse an object-shaped fragment (a body/query/params section).
    ///
    /// `path` names the fragment in error messages.
    pub fn from_value(value: Value, path: &str) -> Result<Self, ConfigurationError> {
        match value {
            Value::Object(mut map) => {
                let required = take_required_flag(&mut map, path)?;
                Self::from_map(map, required, path)
            }
            other => Err(invalid(
                path,
                format!("expected a schema object, found {}", json_type(&other)),
            )),
        }
    }

    fn from_map(
        mut map: Map<String, Value>,
        required: bool,
        path: &str,
    ) -> Result<Self, ConfigurationError> {
        let properties = match map.remove("properties") {
            None => None,
            Some(Value::Object(properties)) => Some(
                properties
                    .into_iter()
                    .map(|(name, fragment)| {
                        let child = format!("{path}.properties.{name}");
                        SchemaFragment::parse(fragment, &child).map(|f| (name, f))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(other) => {
                return Err(invalid(
                    path,
                    format!("'properties' must be an object, found {}", json_type(&other)),
                ))
            }
        };

        let required_names = match map.remove("required") {
            None => Vec::new(),
            Some(Value::Array(names)) => names
                .into_iter()
                .map(|name| match name {
                    Value::String(name) => Ok(name),
                    other => Err(invalid(
                        path,
                        format!("'required' entries must be strings, found {}", json_type(&other)),
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(invalid(
                    path,
                    format!("'required' must be a boolean or an array, found {}", json_type(&other)),
                ))
            }
        };

        Ok(Self {
            properties,
            additional_properties: map.remove("additionalProperties"),
            required_names,
            required,
            keywords: map,
        })
    }

    /// The declared `type`, when it is a single known name.
    pub fn declared_type(&self) -> Option<PrimitiveType> {
        self.keywords
            .get("type")
            .and_then(Value::as_str)
            .and_then(PrimitiveType::from_name)
    }

    /// Look up a declared property.
    pub fn property(&self, name: &str) -> Option<&SchemaFragment> {
        self.properties
            .as_ref()?
            .iter()
            .find(|(declared, _)| declared == name)
            .map(|(_, fragment)| fragment)
    }

    /// Shallow merge with `self` layered on top of `base`.
    ///
    /// Every top-level field set on `self` replaces the base's; keywords and
    /// properties are merged key by key with `self` winning.
    pub fn layered_over(&self, base: &ObjectFragment) -> ObjectFragment {
        let mut keywords = base.keywords.clone();
        keywords.extend(self.keywords.clone());

        let properties = match (&base.properties, &self.properties) {
            (Some(base_props), Some(own)) => {
                let mut merged = base_props.clone();
                for (name, fragment) in own {
                    match merged.iter_mut().find(|(existing, _)| existing == name) {
                        Some(slot) => slot.1 = fragment.clone(),
                        None => merged.push((name.clone(), fragment.clone())),
                    }
                }
                Some(merged)
            }
            (base_props, own) => own.clone().or_else(|| base_props.clone()),
        };

        ObjectFragment {
            properties,
            additional_properties: self
                .additional_properties
                .clone()
                .or_else(|| base.additional_properties.clone()),
            required_names: if self.required_names.is_empty() {
                base.required_names.clone()
            } else {
                self.required_names.clone()
            },
            required: self.required || base.required,
            keywords,
        }
    }

    /// Render as a Draft 2020-12 JSON Schema value.
    pub fn to_schema(&self) -> Value {
        let mut schema = self.keywords.clone();
        let mut required = self.required_names.clone();

        if let Some(properties) = &self.properties {
            let mut rendered = Map::new();
            for (name, fragment) in properties {
                rendered.insert(name.clone(), fragment.to_schema());
                if fragment.is_required() && !required.contains(name) {
                    required.push(name.clone());
                }
            }
            schema.insert("properties".into(), Value::Object(rendered));
        }
        if !required.is_empty() {
            schema.insert(
                "required".into(),
                Value::Array(required.into_iter().map(Value::String).collect()),
            );
        }
        if let Some(additional) = &self.additional_properties {
            schema.insert("additionalProperties".into(), additional.clone());
        }
        Value::Object(schema)
    }
}

fn take_required_flag(map: &mut Map<String, Value>, path: &str) -> Result<bool, ConfigurationError> {
    match map.get("required") {
        Some(Value::Bool(flag)) => {
            let flag = *flag;
            map.remove("required");
            Ok(flag)
        }
        None | Some(Value::Array(_)) => Ok(false),
        Some(other) => Err(invalid(
            path,
            format!("'required' must be a boolean or an array, found {}", json_type(other)),
        )),
    }
}

fn invalid(path: &str, reason: String) -> ConfigurationError {
    ConfigurationError::InvalidFragment {
        path: path.to_string(),
        reason,
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
