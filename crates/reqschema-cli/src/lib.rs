//! # reqschema-cli: Request Schema CLI
//!
//! Offline tooling over request schema files (JSON or YAML):
//!
//! - `reqschema compose` prints the composite JSON Schema a definition
//!   compiles to under a strictness policy.
//! - `reqschema check` runs a sample request through the full pipeline
//!   (coercion, validation, error reporting) and prints the coerced request
//!   or the error payload.
//!
//! ```bash
//! reqschema compose --schema routes/orders.yaml --no-strict
//! reqschema check --schema routes/orders.yaml --param id=42 --query page=2 \
//!     --body @order.json --display-errors true
//! ```

pub mod check;
pub mod compose;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

/// Read an inline argument, or the contents of the file it names when it
/// starts with `@`.
pub fn read_input(arg: &str) -> Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))
        }
        None => Ok(arg.to_string()),
    }
}

/// Parse `KEY=VALUE` arguments into a string map; repeated keys collect
/// into arrays, like repeated query-string keys.
pub fn parse_pairs(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut fields = Map::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("expected KEY=VALUE, got '{pair}'");
        };
        let value = Value::from(value);
        match fields.get_mut(key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                fields.insert(key.to_string(), value);
            }
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pairs_split_on_first_equals() {
        let fields = parse_pairs(&["a=1".into(), "expr=x=y".into(), "a=2".into()]).unwrap();
        assert_eq!(Value::Object(fields), json!({ "a": ["1", "2"], "expr": "x=y" }));
    }

    #[test]
    fn pair_without_equals_is_rejected() {
        let err = parse_pairs(&["novalue".into()]).unwrap_err();
        assert!(err.to_string().contains("novalue"));
    }

    #[test]
    fn inputs_read_inline_or_from_file() {
        assert_eq!(read_input(r#"{"a":1}"#).unwrap(), r#"{"a":1}"#);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.json");
        std::fs::write(&path, r#"{"b":2}"#).unwrap();
        assert_eq!(read_input(&format!("@{}", path.display())).unwrap(), r#"{"b":2}"#);

        assert!(read_input("@/definitely/not/here.json").is_err());
    }
}
