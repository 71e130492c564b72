//! # Type Coercion
//!
//! Walks a request value together with its fragment and converts string
//! leaves to their declared type. Only non-empty strings are ever
//! converted; values that already carry a native type are left alone, and
//! fields missing from the value are never created.
//!
//! ## Converters
//!
//! | Type      | Rule                                                        |
//! |-----------|-------------------------------------------------------------|
//! | `date`    | Parsed and normalized to `YYYY-MM-DDTHH:MM:SS.mmmZ`; unparseable text becomes `"Invalid Date"` |
//! | `integer` | Leading base-10 digit run (`"12px"` → 12); none → `null`    |
//! | `number`  | Longest leading decimal literal (`"1.5e3x"` → 1500); none → `null` |
//! | `boolean` | Exactly `"true"` → `true`; every other string → `false`     |
//! | `object`  | JSON text; malformed text is a [`CoercionError`]            |
//!
//! `null` is the not-a-number sentinel: JSON cannot hold NaN, and
//! serde_json renders non-finite floats as `null` too. Sentinels are left
//! for schema validation to reject.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use crate::error::CoercionError;
use crate::fragment::{ObjectFragment, PrimitiveType, SchemaFragment};

/// Result of a failed date conversion.
pub const INVALID_DATE: &str = "Invalid Date";

/// Which declared types may be converted in a given section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoercionTargets {
    /// Every convertible type.
    Any,
    /// Only the listed types.
    Only(&'static [PrimitiveType]),
}

impl CoercionTargets {
    pub fn allows(self, kind: PrimitiveType) -> bool {
        match self {
            Self::Any => true,
            Self::Only(kinds) => kinds.contains(&kind),
        }
    }
}

/// A conversion that produced a sentinel instead of a typed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LossyConversion {
    /// Dotted path of the value, e.g. `query.page`.
    pub path: String,
    pub target: PrimitiveType,
    /// The input string.
    pub input: String,
}

/// Convert one string to `kind`.
///
/// Returns `Ok(None)` for types without a converter.
///
/// # Errors
///
/// Returns the JSON parser error for malformed `object` text.
pub fn convert(kind: PrimitiveType, raw: &str) -> Result<Option<Value>, serde_json::Error> {
    let value = match kind {
        PrimitiveType::Date => Value::String(match parse_date(raw) {
            Some(date) => date.to_rfc3339_opts(SecondsFormat::Millis, true),
            None => INVALID_DATE.to_string(),
        }),
        PrimitiveType::Integer => parse_integer_prefix(raw),
        PrimitiveType::Number => parse_float_prefix(raw)
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number),
        PrimitiveType::Boolean => Value::Bool(raw == "true"),
        PrimitiveType::Object => serde_json::from_str(raw)?,
        PrimitiveType::String | PrimitiveType::Array | PrimitiveType::Null => return Ok(None),
    };
    Ok(Some(value))
}

/// Coerce `value` in place against `fragment`.
///
/// # Errors
///
/// Returns `CoercionError::MalformedJson` when an `object`-typed string
/// is not valid JSON. `value` may be partially coerced in that case.
pub fn coerce(
    value: &mut Value,
    fragment: &SchemaFragment,
    targets: CoercionTargets,
) -> Result<(), CoercionError> {
    let mut walker = Walker {
        targets,
        lossy: Vec::new(),
    };
    walker.visit(value, fragment, "$")
}

/// Coerce the fields of an object against an object fragment, reporting
/// sentinel conversions. `path` prefixes reported paths (usually the
/// section name).
pub fn coerce_fields(
    fields: &mut Map<String, Value>,
    object: &ObjectFragment,
    targets: CoercionTargets,
    path: &str,
) -> Result<Vec<LossyConversion>, CoercionError> {
    let mut walker = Walker {
        targets,
        lossy: Vec::new(),
    };
    walker.visit_fields(fields, object, path)?;
    Ok(walker.lossy)
}

struct Walker {
    targets: CoercionTargets,
    lossy: Vec<LossyConversion>,
}

impl Walker {
    fn visit(
        &mut self,
        value: &mut Value,
        fragment: &SchemaFragment,
        path: &str,
    ) -> Result<(), CoercionError> {
        if let Some(kind) = fragment.primitive_type().filter(|k| k.is_convertible()) {
            let converted = match &*value {
                Value::String(raw) => {
                    // Empty values stay as sent and fail validation.
                    if raw.is_empty() || !self.targets.allows(kind) {
                        return Ok(());
                    }
                    let converted = convert(kind, raw)
                        .map_err(|source| CoercionError::MalformedJson {
                            path: path.to_string(),
                            source,
                        })?
                        .unwrap_or_else(|| value.clone());
                    if is_sentinel(kind, &converted) {
                        self.lossy.push(LossyConversion {
                            path: path.to_string(),
                            target: kind,
                            input: raw.clone(),
                        });
                    }
                    Some(converted)
                }
                _ => None,
            };
            if let Some(converted) = converted {
                *value = converted;
                return Ok(());
            }
        }

        if let (SchemaFragment::Object(object), Value::Object(fields)) = (fragment, value) {
            self.visit_fields(fields, object, path)?;
        }
        Ok(())
    }

    fn visit_fields(
        &mut self,
        fields: &mut Map<String, Value>,
        object: &ObjectFragment,
        path: &str,
    ) -> Result<(), CoercionError> {
        let Some(properties) = &object.properties else {
            return Ok(());
        };
        for (name, child) in properties {
            if let Some(field) = fields.get_mut(name) {
                self.visit(field, child, &format!("{path}.{name}"))?;
            }
        }
        Ok(())
    }
}

fn is_sentinel(kind: PrimitiveType, value: &Value) -> bool {
    match kind {
        PrimitiveType::Integer | PrimitiveType::Number => value.is_null(),
        PrimitiveType::Date => value.as_str() == Some(INVALID_DATE),
        _ => false,
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let text = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(text) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_integer_prefix(raw: &str) -> Value {
    let text = raw.trim_start();
    let (sign, rest) = match text.as_bytes().first() {
        Some(b'-') => ("-", &text[1..]),
        Some(b'+') => ("", &text[1..]),
        _ => ("", text),
    };
    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .map_or(rest, |end| &rest[..end]);
    if digits.is_empty() {
        return Value::Null;
    }

    let literal = format!("{sign}{digits}");
    match literal.parse::<i64>() {
        Ok(n) => Value::from(n),
        // Beyond i64: keep the magnitude as a float.
        Err(_) => literal
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number),
    }
}

fn parse_float_prefix(raw: &str) -> Option<f64> {
    let text = raw.trim_start();
    let bytes = text.as_bytes();
    let digits_from = |mut at: usize| {
        while at < bytes.len() && bytes[at].is_ascii_digit() {
            at += 1;
        }
        at
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - (end + 1);
        if mantissa_digits > 0 {
            end = frac_end;
        }
    }
    if mantissa_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }

    text[..end].parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fragment(value: Value) -> SchemaFragment {
        SchemaFragment::from_value(value).unwrap()
    }

    fn converted(kind: PrimitiveType, raw: &str) -> Value {
        convert(kind, raw).unwrap().unwrap()
    }

    #[test]
    fn boolean_is_exactly_the_string_true() {
        assert_eq!(converted(PrimitiveType::Boolean, "true"), json!(true));
        assert_eq!(converted(PrimitiveType::Boolean, "false"), json!(false));
        assert_eq!(converted(PrimitiveType::Boolean, ""), json!(false));
        assert_eq!(converted(PrimitiveType::Boolean, "True"), json!(false));
        assert_eq!(converted(PrimitiveType::Boolean, "1"), json!(false));
    }

    #[test]
    fn integer_reads_the_leading_digit_run() {
        assert_eq!(converted(PrimitiveType::Integer, "123"), json!(123));
        assert_eq!(converted(PrimitiveType::Integer, "  -42px"), json!(-42));
        assert_eq!(converted(PrimitiveType::Integer, "+7"), json!(7));
        assert_eq!(converted(PrimitiveType::Integer, "3.9"), json!(3));
        assert_eq!(converted(PrimitiveType::Integer, "0x10"), json!(0));
        assert_eq!(converted(PrimitiveType::Integer, "abc"), Value::Null);
        assert_eq!(converted(PrimitiveType::Integer, ""), Value::Null);
        assert_eq!(converted(PrimitiveType::Integer, "-"), Value::Null);
        assert!(converted(PrimitiveType::Integer, "99999999999999999999").is_f64());
    }

    #[test]
    fn number_reads_the_leading_decimal_literal() {
        assert_eq!(converted(PrimitiveType::Number, "1.5"), json!(1.5));
        assert_eq!(converted(PrimitiveType::Number, "-0.25kg"), json!(-0.25));
        assert_eq!(converted(PrimitiveType::Number, ".5"), json!(0.5));
        assert_eq!(converted(PrimitiveType::Number, "1.5e3x"), json!(1500.0));
        assert_eq!(converted(PrimitiveType::Number, "2e"), json!(2.0));
        assert_eq!(converted(PrimitiveType::Number, "12"), json!(12.0));
        assert_eq!(converted(PrimitiveType::Number, "."), Value::Null);
        assert_eq!(converted(PrimitiveType::Number, "abc"), Value::Null);
        assert_eq!(converted(PrimitiveType::Number, "1e999"), Value::Null);
    }

    #[test]
    fn date_normalizes_or_yields_invalid_date() {
        assert_eq!(
            converted(PrimitiveType::Date, "2024-03-01"),
            json!("2024-03-01T00:00:00.000Z")
        );
        assert_eq!(
            converted(PrimitiveType::Date, "2024-03-01T10:30:00+02:00"),
            json!("2024-03-01T08:30:00.000Z")
        );
        assert_eq!(
            converted(PrimitiveType::Date, "2024-03-01T10:30:00.5"),
            json!("2024-03-01T10:30:00.500Z")
        );
        assert_eq!(
            converted(PrimitiveType::Date, "Fri, 01 Mar 2024 10:30:00 GMT"),
            json!("2024-03-01T10:30:00.000Z")
        );
        assert_eq!(converted(PrimitiveType::Date, "not a date"), json!(INVALID_DATE));
    }

    #[test]
    fn object_parses_json_text() {
        assert_eq!(
            converted(PrimitiveType::Object, r#"{"a":[1,2]}"#),
            json!({ "a": [1, 2] })
        );
        assert!(convert(PrimitiveType::Object, "{not json").is_err());
    }

    #[test]
    fn types_without_converters_are_skipped() {
        assert!(convert(PrimitiveType::String, "x").unwrap().is_none());
        assert!(convert(PrimitiveType::Array, "x").unwrap().is_none());
    }

    #[test]
    fn typed_values_are_left_alone() {
        let schema = fragment(json!({ "type": "integer" }));
        let mut value = json!(5);
        coerce(&mut value, &schema, CoercionTargets::Any).unwrap();
        assert_eq!(value, json!(5));

        let mut flag = json!(true);
        coerce(&mut flag, &fragment(json!({ "type": "boolean" })), CoercionTargets::Any).unwrap();
        assert_eq!(flag, json!(true));
    }

    #[test]
    fn recurses_into_declared_properties_only() {
        let schema = fragment(json!({
            "properties": {
                "page": { "type": "integer" },
                "filter": {
                    "properties": {
                        "active": { "type": "boolean" },
                        "since": { "type": "date" }
                    }
                }
            }
        }));
        let mut value = json!({
            "page": "2",
            "extra": "7",
            "filter": { "active": "true", "since": "2024-01-02" }
        });
        coerce(&mut value, &schema, CoercionTargets::Any).unwrap();
        assert_eq!(
            value,
            json!({
                "page": 2,
                "extra": "7",
                "filter": { "active": true, "since": "2024-01-02T00:00:00.000Z" }
            })
        );
    }

    #[test]
    fn missing_fields_are_not_invented() {
        let schema = fragment(json!({
            "properties": { "a": { "type": "integer", "required": true } }
        }));
        let mut value = json!({});
        coerce(&mut value, &schema, CoercionTargets::Any).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn empty_strings_are_not_converted() {
        let schema = fragment(json!({
            "properties": {
                "flag": { "type": "boolean" },
                "page": { "type": "integer" },
                "since": { "type": "date" }
            }
        }));
        let mut value = json!({ "flag": "", "page": "", "since": "" });
        coerce(&mut value, &schema, CoercionTargets::Any).unwrap();
        assert_eq!(value, json!({ "flag": "", "page": "", "since": "" }));
    }

    #[test]
    fn restricted_targets_only_convert_listed_types() {
        let schema = fragment(json!({
            "properties": {
                "count": { "type": "integer" },
                "ratio": { "type": "number" },
                "flag": { "type": "boolean" },
                "meta": { "type": "object" },
                "at": { "type": "date" }
            }
        }));
        let mut value = json!({
            "count": "1",
            "ratio": "0.5",
            "flag": "true",
            "meta": "{}",
            "at": "2024-01-02"
        });
        coerce(&mut value, &schema, CoercionTargets::Only(&[PrimitiveType::Date])).unwrap();
        assert_eq!(
            value,
            json!({
                "count": "1",
                "ratio": "0.5",
                "flag": "true",
                "meta": "{}",
                "at": "2024-01-02T00:00:00.000Z"
            })
        );
    }

    #[test]
    fn object_string_is_parsed_without_recursing() {
        let schema = fragment(json!({
            "properties": {
                "filter": {
                    "type": "object",
                    "properties": { "limit": { "type": "integer" } }
                }
            }
        }));
        let mut value = json!({ "filter": r#"{"limit":"5"}"# });
        coerce(&mut value, &schema, CoercionTargets::Any).unwrap();
        assert_eq!(value, json!({ "filter": { "limit": "5" } }));
    }

    #[test]
    fn malformed_object_text_is_an_error_with_path() {
        let object = ObjectFragment::from_value(
            json!({ "properties": { "filter": { "type": "object" } } }),
            "query",
        )
        .unwrap();
        let mut fields = json!({ "filter": "{oops" }).as_object().cloned().unwrap();
        let err = coerce_fields(&mut fields, &object, CoercionTargets::Any, "query").unwrap_err();
        let CoercionError::MalformedJson { path, .. } = err;
        assert_eq!(path, "query.filter");
    }

    #[test]
    fn sentinel_conversions_are_reported() {
        let object = ObjectFragment::from_value(
            json!({
                "properties": {
                    "page": { "type": "integer" },
                    "since": { "type": "date" },
                    "ok": { "type": "integer" }
                }
            }),
            "query",
        )
        .unwrap();
        let mut fields = json!({ "page": "first", "since": "yesterday", "ok": "3" })
            .as_object()
            .cloned()
            .unwrap();
        let lossy = coerce_fields(&mut fields, &object, CoercionTargets::Any, "query").unwrap();
        assert_eq!(
            lossy,
            vec![
                LossyConversion {
                    path: "query.page".into(),
                    target: PrimitiveType::Integer,
                    input: "first".into(),
                },
                LossyConversion {
                    path: "query.since".into(),
                    target: PrimitiveType::Date,
                    input: "yesterday".into(),
                },
            ]
        );
        assert_eq!(fields["page"], Value::Null);
        assert_eq!(fields["ok"], json!(3));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Only the exact string "true" converts to true.
            #[test]
            fn boolean_true_iff_exact(s in ".{0,12}") {
                let value = converted(PrimitiveType::Boolean, &s);
                prop_assert_eq!(value, Value::Bool(s == "true"));
            }

            /// Decimal integer strings round-trip through integer coercion.
            #[test]
            fn integer_strings_round_trip(n in any::<i64>()) {
                prop_assert_eq!(converted(PrimitiveType::Integer, &n.to_string()), json!(n));
            }

            /// Trailing garbage after the digit run is ignored.
            #[test]
            fn integer_ignores_suffix(n in 0i64..1_000_000, suffix in "[a-z%]{1,5}") {
                let text = format!("{n}{suffix}");
                prop_assert_eq!(converted(PrimitiveType::Integer, &text), json!(n));
            }

            /// Coercion is idempotent: a second pass changes nothing.
            #[test]
            fn coercion_is_idempotent(page in ".{0,8}", flag in ".{0,8}") {
                let schema = SchemaFragment::from_value(json!({
                    "properties": {
                        "page": { "type": "integer" },
                        "flag": { "type": "boolean" }
                    }
                })).unwrap();
                let mut value = json!({ "page": page, "flag": flag });
                coerce(&mut value, &schema, CoercionTargets::Any).unwrap();
                let once = value.clone();
                coerce(&mut value, &schema, CoercionTargets::Any).unwrap();
                prop_assert_eq!(value, once);
            }
        }
    }
}
