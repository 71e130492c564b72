//! # Error Reporter
//!
//! Shapes a failed [`ValidationResult`] into the transport-agnostic
//! [`ErrorPayload`]:
//!
//! ```json
//! {
//!   "message": "Invalid request parameters",
//!   "status": 400,
//!   "details": { "validationErrors": [ ... ] }
//! }
//! ```
//!
//! `validationErrors` is `null` unless errors are displayed. When they are,
//! the violations are passed through unmodified and in engine order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::{ValidationResult, Violation};

/// Top-level message of every validation failure.
pub const INVALID_PARAMS_MESSAGE: &str = "Invalid request parameters";

/// Status of every validation failure.
pub const VALIDATION_STATUS: u16 = 400;

/// Environment tags in which violation details are displayed by default.
pub const DEVELOPMENT_ENVIRONMENTS: &[&str] = &["development", "dev", "test", "testing"];

/// The structured validation failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    pub status: u16,
    pub details: ErrorDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Ordered violations, or `None` when details are hidden.
    #[serde(rename = "validationErrors")]
    pub validation_errors: Option<Vec<Violation>>,
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Build the payload for a failed validation.
pub fn report(result: ValidationResult, display_errors: bool) -> ErrorPayload {
    ErrorPayload {
        message: INVALID_PARAMS_MESSAGE.to_string(),
        status: VALIDATION_STATUS,
        details: ErrorDetails {
            validation_errors: display_errors.then_some(result.errors),
        },
    }
}

/// Default display-errors policy for an environment tag.
///
/// Only the development/test tags in [`DEVELOPMENT_ENVIRONMENTS`] display
/// details; an absent or unknown tag hides them.
pub fn displays_errors_in(environment: Option<&str>) -> bool {
    environment.is_some_and(|env| {
        DEVELOPMENT_ENVIRONMENTS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(env.trim()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn violation(stack: &str) -> Violation {
        let (property, message) = stack.split_once(' ').unwrap();
        Violation {
            property: property.into(),
            message: message.into(),
            stack: stack.into(),
            name: "enum".into(),
            argument: json!(["a", "b", "c"]),
            instance_path: "/params/a".into(),
            schema_path: "/properties/params/properties/a/enum".into(),
        }
    }

    fn failed() -> ValidationResult {
        ValidationResult {
            errors: vec![
                violation("request.body.a is not of a type(s) integer"),
                violation("request.params.a is not one of enum values: a,b,c"),
            ],
        }
    }

    #[test]
    fn displayed_details_keep_order_and_content() {
        let result = failed();
        let payload = report(result.clone(), true);
        assert_eq!(payload.message, "Invalid request parameters");
        assert_eq!(payload.status, 400);
        assert_eq!(payload.details.validation_errors, Some(result.errors));
    }

    #[test]
    fn hidden_details_serialize_as_null() {
        let payload = report(failed(), false);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            json!({
                "message": "Invalid request parameters",
                "status": 400,
                "details": { "validationErrors": null }
            })
        );
    }

    #[test]
    fn payload_wire_shape() {
        let json = serde_json::to_value(report(failed(), true)).unwrap();
        let errors = json["details"]["validationErrors"].as_array().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors[1]["stack"],
            "request.params.a is not one of enum values: a,b,c"
        );
        assert_eq!(errors[1]["property"], "request.params.a");
    }

    #[test]
    fn payload_displays_its_message() {
        assert_eq!(report(failed(), false).to_string(), INVALID_PARAMS_MESSAGE);
    }

    #[test]
    fn environment_policy() {
        assert!(displays_errors_in(Some("development")));
        assert!(displays_errors_in(Some("test")));
        assert!(displays_errors_in(Some("Dev")));
        assert!(!displays_errors_in(Some("production")));
        assert!(!displays_errors_in(Some("staging")));
        assert!(!displays_errors_in(None));
    }
}
