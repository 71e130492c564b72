//! # Compose Subcommand
//!
//! Prints the composite JSON Schema for a schema definition file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use reqschema_core::{compose, SchemaDefinition, StrictnessPolicy};

/// Arguments for the `reqschema compose` subcommand.
#[derive(Args, Debug)]
pub struct ComposeArgs {
    /// Schema definition file (JSON, or YAML by extension).
    #[arg(long, value_name = "FILE")]
    pub schema: PathBuf,

    /// Compose with the permissive base (unknown fields allowed).
    #[arg(long)]
    pub no_strict: bool,
}

/// Build the composite schema document for `args`.
pub fn composite_document(args: &ComposeArgs) -> Result<Value> {
    let definition = SchemaDefinition::from_path(&args.schema)
        .with_context(|| format!("failed to load schema {}", args.schema.display()))?;
    let policy = StrictnessPolicy::from_strict(!args.no_strict);
    tracing::debug!(?policy, "composing schema");
    Ok(compose(&definition, policy).document().clone())
}

/// Execute the compose subcommand. Returns exit code 0.
pub fn run_compose(args: &ComposeArgs) -> Result<u8> {
    let document = composite_document(args)?;
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_schema(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn composes_yaml_definitions() {
        let dir = tempfile::tempdir().unwrap();
        let schema = write_schema(
            &dir,
            "route.yaml",
            "query:\n  properties:\n    page:\n      type: integer\n      required: true\n",
        );

        let document = composite_document(&ComposeArgs {
            schema,
            no_strict: false,
        })
        .unwrap();
        let query = &document["properties"]["query"];
        assert_eq!(query["additionalProperties"], false);
        assert_eq!(query["required"], json!(["page"]));
        assert_eq!(query["properties"]["page"], json!({ "type": "integer" }));
    }

    #[test]
    fn no_strict_opens_sections() {
        let dir = tempfile::tempdir().unwrap();
        let schema = write_schema(&dir, "route.json", r#"{ "body": { "properties": {} } }"#);

        let document = composite_document(&ComposeArgs {
            schema,
            no_strict: true,
        })
        .unwrap();
        assert_eq!(document["properties"]["body"]["additionalProperties"], true);
        assert_eq!(document["additionalProperties"], false);
    }

    #[test]
    fn invalid_definition_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let schema = write_schema(&dir, "route.json", r#"{ "headers": {} }"#);
        let err = composite_document(&ComposeArgs {
            schema,
            no_strict: false,
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("headers"));
    }
}
