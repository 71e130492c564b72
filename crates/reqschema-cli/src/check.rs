//! # Check Subcommand
//!
//! Runs a sample request through a schema definition exactly as the
//! middleware would: coercion, validation, error reporting.
//!
//! Options come from three layers, later ones winning: built-in defaults,
//! an optional `--config` file (YAML or JSON, camelCase keys), and flags.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{json, Value};

use reqschema_core::{
    ErrorPayload, OptionOverrides, RequestContext, RequestError, RequestSchemaFactory,
    SchemaDefinition,
};

use crate::{parse_pairs, read_input};

/// Arguments for the `reqschema check` subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Schema definition file (JSON, or YAML by extension).
    #[arg(long, value_name = "FILE")]
    pub schema: PathBuf,

    /// Request body as JSON text, or @FILE.
    #[arg(long, value_name = "JSON|@FILE")]
    pub body: Option<String>,

    /// Query parameter; repeat for more (and for array values).
    #[arg(long = "query", value_name = "KEY=VALUE")]
    pub query: Vec<String>,

    /// Path parameter; repeat for more.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Options file (coerceTypes, strict, displayErrors).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Validate the raw strings without coercion.
    #[arg(long)]
    pub no_coerce: bool,

    /// Allow unknown fields in every section.
    #[arg(long)]
    pub no_strict: bool,

    /// Include violations in the error payload.
    #[arg(long, value_name = "BOOL")]
    pub display_errors: Option<bool>,

    /// Environment tag used when --display-errors is not given.
    #[arg(long, value_name = "ENV")]
    pub env: Option<String>,
}

/// Result of checking one request.
#[derive(Debug)]
pub enum CheckOutcome {
    /// The coerced `{body, query, params}`.
    Passed(Value),
    /// The validation error payload.
    Rejected(ErrorPayload),
}

/// Run the pipeline for `args`.
///
/// Validation failures are an `Ok(CheckOutcome::Rejected)`; everything else
/// that goes wrong (unreadable files, coercion failures) is an error.
pub fn check_request(args: &CheckArgs) -> Result<CheckOutcome> {
    let definition = SchemaDefinition::from_path(&args.schema)
        .with_context(|| format!("failed to load schema {}", args.schema.display()))?;

    let defaults = match &args.config {
        Some(path) => OptionOverrides::from_path(path)
            .with_context(|| format!("failed to load options {}", path.display()))?,
        None => OptionOverrides::default(),
    };
    let schema = RequestSchemaFactory::new(defaults).build(definition, flag_overrides(args))?;

    let body = match &args.body {
        Some(arg) => serde_json::from_str(&read_input(arg)?).context("body is not valid JSON")?,
        None => Value::Null,
    };
    let mut ctx = RequestContext {
        body,
        query: parse_pairs(&args.query)?,
        params: parse_pairs(&args.params)?,
        environment: args.env.clone(),
    };

    match schema.check(&mut ctx) {
        Ok(outcome) => {
            tracing::info!(?outcome, "request accepted");
            Ok(CheckOutcome::Passed(json!({
                "body": ctx.body,
                "query": ctx.query,
                "params": ctx.params,
            })))
        }
        Err(RequestError::Validation(payload)) => Ok(CheckOutcome::Rejected(payload)),
        Err(other) => Err(other).context("request could not be checked"),
    }
}

fn flag_overrides(args: &CheckArgs) -> OptionOverrides {
    OptionOverrides {
        coerce_types: args.no_coerce.then_some(false),
        strict: args.no_strict.then_some(false),
        display_errors: args.display_errors,
        ..OptionOverrides::default()
    }
}

/// Execute the check subcommand.
///
/// Returns exit code: 0 when the request passes, 1 when it is rejected.
pub fn run_check(args: &CheckArgs) -> Result<u8> {
    match check_request(args)? {
        CheckOutcome::Passed(request) => {
            println!("{}", serde_json::to_string_pretty(&request)?);
            Ok(0)
        }
        CheckOutcome::Rejected(payload) => {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn args(schema: PathBuf) -> CheckArgs {
        CheckArgs {
            schema,
            body: None,
            query: Vec::new(),
            params: Vec::new(),
            config: None,
            no_coerce: false,
            no_strict: false,
            display_errors: Some(true),
            env: None,
        }
    }

    fn orders_schema(dir: &Path) -> PathBuf {
        write(
            dir,
            "orders.yaml",
            r#"
params:
  properties:
    id:
      type: integer
      required: true
query:
  properties:
    expand:
      type: boolean
body:
  properties:
    due:
      type: date
"#,
        )
    }

    #[test]
    fn passing_request_prints_coerced_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args(orders_schema(dir.path()));
        args.params = vec!["id=42".into()];
        args.query = vec!["expand=true".into()];
        args.body = Some(r#"{"due":"2024-05-01"}"#.into());

        match check_request(&args).unwrap() {
            CheckOutcome::Passed(request) => {
                assert_eq!(request["params"]["id"], json!(42));
                assert_eq!(request["query"]["expand"], json!(true));
                assert_eq!(request["body"]["due"], "2024-05-01T00:00:00.000Z");
            }
            other => panic!("expected pass, got {other:?}"),
        }
        assert_eq!(run_check(&args).unwrap(), 0);
    }

    #[test]
    fn rejected_request_carries_violations() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args(orders_schema(dir.path()));
        args.params = vec!["id=42".into()];
        args.query = vec!["verbose=1".into()];

        match check_request(&args).unwrap() {
            CheckOutcome::Rejected(payload) => {
                let errors = payload.details.validation_errors.unwrap();
                assert_eq!(
                    errors[0].stack,
                    r#"request.query additionalProperty "verbose" exists in instance when not allowed"#
                );
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(run_check(&args).unwrap(), 1);
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = write(dir.path(), "options.yaml", "strict: false\ncoerceTypes: false\n");
        let mut args = args(orders_schema(dir.path()));
        args.config = Some(config);
        args.params = vec!["id=42".into()];
        args.query = vec!["verbose=1".into()];

        // Config disables coercion: "42" is not an integer.
        assert!(matches!(check_request(&args).unwrap(), CheckOutcome::Rejected(_)));

        // The permissive config accepts the extra query field once coercion is back.
        args.config = Some(write(dir.path(), "permissive.yaml", "strict: false\n"));
        assert!(matches!(check_request(&args).unwrap(), CheckOutcome::Passed(_)));

        // --no-strict wins over a strict config file.
        args.config = Some(write(dir.path(), "strict.yaml", "strict: true\n"));
        assert!(matches!(check_request(&args).unwrap(), CheckOutcome::Rejected(_)));
        args.no_strict = true;
        assert!(matches!(check_request(&args).unwrap(), CheckOutcome::Passed(_)));
    }

    #[test]
    fn environment_drives_default_display() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args(orders_schema(dir.path()));
        args.display_errors = None;
        args.env = Some("production".into());

        match check_request(&args).unwrap() {
            CheckOutcome::Rejected(payload) => assert!(payload.details.validation_errors.is_none()),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn malformed_object_input_is_an_operational_error() {
        let dir = tempfile::tempdir().unwrap();
        let schema = write(
            dir.path(),
            "search.json",
            r#"{ "query": { "properties": { "filter": { "type": "object" } } } }"#,
        );
        let mut args = args(schema);
        args.query = vec!["filter={oops".into()];

        let err = check_request(&args).unwrap_err();
        assert!(format!("{err:#}").contains("query.filter"));
    }

    #[test]
    fn missing_schema_file_is_an_operational_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_request(&args(dir.path().join("absent.json"))).unwrap_err();
        assert!(err.to_string().contains("failed to load schema"));
    }
}
