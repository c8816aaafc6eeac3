//! Error types for Sluice.
//!
//! Errors fall into two groups:
//!
//! - **Compile-time** errors ([`SchemaError`]) raised while a route contract is
//!   being built. They abort startup.
//! - **Request-time** errors ([`FieldError`], [`ShapeError`], [`RegistryError`]
//!   and handler failures) which are always recovered into a wire response by
//!   way of [`SluiceError`].
//!
//! # Wire format
//!
//! | Category | Status | Body |
//! |---|---|---|
//! | `Validation` | 400 | `{"success":false,"error":"Validation failed","errors":[...]}` |
//! | `NotFound` | 404 | `{"success":false,"error":"Not Found"}` |
//! | `Contract`, `Registry`, `Handler`, `Internal` | 500 | `{"success":false,"error":"<message>"}` |
//! | `Timeout` | 504 | `{"success":false,"error":"<message>"}` |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::schema::FieldType;

/// Result type alias using [`SluiceError`].
pub type SluiceResult<T> = Result<T, SluiceError>;

/// Message sent to clients for server-side failures whose details stay in logs.
const INTERNAL_MESSAGE: &str = "Internal Server Error";

/// The constraint a field violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Constraint {
    /// A required field was absent.
    Required,
    /// The value could not be coerced to the declared type.
    Type,
    /// The value is below the declared minimum (length or numeric).
    Min,
    /// The value is above the declared maximum (length or numeric).
    Max,
    /// The value has the right type but the wrong shape (e.g. email).
    Format,
}

impl Constraint {
    /// Returns the wire name of the constraint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Type => "type",
            Self::Min => "min",
            Self::Max => "max",
            Self::Format => "format",
        }
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field that failed request validation.
///
/// Serialized as `{ "field", "constraint", "value" }` inside the 400 envelope.
/// `value` is the raw input (before coercion), or `null` for missing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the offending field.
    pub field: String,
    /// The violated constraint.
    pub constraint: Constraint,
    /// The raw value that was supplied.
    pub value: Value,
}

impl FieldError {
    /// Creates a new field error.
    #[must_use]
    pub fn new(field: impl Into<String>, constraint: Constraint, value: Value) -> Self {
        Self {
            field: field.into(),
            constraint,
            value,
        }
    }

    /// Creates a `required` error for a missing field.
    #[must_use]
    pub fn required(field: impl Into<String>) -> Self {
        Self::new(field, Constraint::Required, Value::Null)
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} (got {})", self.field, self.constraint, self.value)
    }
}

/// Invalid schema definitions, detected when a route contract is built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// A field declared a type outside the closed set.
    #[error("field '{field}' has unknown type '{type_name}' (expected string, number, boolean, email or object)")]
    UnknownType {
        /// The field name.
        field: String,
        /// The type name that was supplied.
        type_name: String,
    },

    /// `min` is greater than `max`.
    #[error("field '{field}' has min {min} greater than max {max}")]
    MinGreaterThanMax {
        /// The field name.
        field: String,
        /// Declared minimum.
        min: f64,
        /// Declared maximum.
        max: f64,
    },

    /// A length bound is negative.
    #[error("field '{field}' has a negative length bound {bound}")]
    NegativeLength {
        /// The field name.
        field: String,
        /// The offending bound.
        bound: f64,
    },

    /// A bound is NaN or infinite.
    #[error("field '{field}' has a non-finite bound")]
    NonFiniteBound {
        /// The field name.
        field: String,
    },

    /// `min`/`max` declared on a type that has no length or magnitude.
    #[error("field '{field}' of type {field_type} does not support the '{constraint}' constraint")]
    UnsupportedConstraint {
        /// The field name.
        field: String,
        /// The field's declared type.
        field_type: FieldType,
        /// The unsupported constraint.
        constraint: Constraint,
    },

    /// The schema document itself could not be parsed.
    #[error("malformed schema: {0}")]
    Malformed(String),
}

/// A handler payload did not satisfy the response schema for its status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    /// A field marked `required` in the response schema was absent.
    #[error("response for status {status} is missing required field '{field}'")]
    MissingField {
        /// Status code whose schema was applied.
        status: u16,
        /// The missing field.
        field: String,
    },

    /// A response schema was declared but the payload is not an object.
    #[error("response for status {status} must be a JSON object, got {kind}")]
    NotAnObject {
        /// Status code whose schema was applied.
        status: u16,
        /// JSON kind of the payload.
        kind: &'static str,
    },
}

/// Failures resolving a named module.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No factory was registered under this name.
    #[error("module '{name}' is not registered")]
    NotRegistered {
        /// The requested module name.
        name: String,
    },

    /// The factory ran and failed. A later lookup will run it again.
    #[error("failed to resolve module '{name}': {source}")]
    Resolution {
        /// The module name.
        name: String,
        /// The factory's error.
        #[source]
        source: anyhow::Error,
    },

    /// The module resolved but is not of the requested type.
    #[error("module '{name}' is not a {expected}")]
    TypeMismatch {
        /// The module name.
        name: String,
        /// The requested Rust type.
        expected: &'static str,
    },
}

/// Categories of request-time errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Request input failed schema validation.
    Validation,
    /// No route or method matched.
    NotFound,
    /// A handler broke its own response contract.
    Contract,
    /// A named module could not be resolved.
    Registry,
    /// A handler returned an error.
    Handler,
    /// The request exceeded the server's timeout.
    Timeout,
    /// Any other server-side failure.
    Internal,
}

impl ErrorCategory {
    /// Returns the HTTP status code for this category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Contract | Self::Registry | Self::Handler | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Umbrella error for everything that can end a request early.
///
/// Every variant renders to a well-formed [`ErrorEnvelope`] via
/// [`SluiceError::to_envelope`].
#[derive(Debug, Error)]
pub enum SluiceError {
    /// One or more fields failed validation, across any input surface.
    #[error("Validation failed")]
    Validation {
        /// Every field error, never just the first.
        errors: Vec<FieldError>,
    },

    /// No route or method matched.
    #[error("Not Found")]
    NotFound,

    /// The handler's payload broke its response schema.
    #[error(transparent)]
    Contract(#[from] ShapeError),

    /// Module resolution failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The handler returned an error.
    #[error("{message}")]
    Handler {
        /// Client-facing message.
        message: String,
        /// The underlying error, logged but never sent to clients.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The request exceeded the configured timeout.
    #[error("{message}")]
    Timeout {
        /// Client-facing message.
        message: String,
    },

    /// Any other server-side failure.
    #[error("{message}")]
    Internal {
        /// Client-facing message.
        message: String,
    },
}

impl SluiceError {
    /// Creates a validation error from the collected field errors.
    #[must_use]
    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self::Validation { errors }
    }

    /// Creates a handler error with a client-facing message.
    #[must_use]
    pub fn handler(message: impl Into<String>, source: Option<anyhow::Error>) -> Self {
        Self::Handler {
            message: message.into(),
            source,
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::NotFound => ErrorCategory::NotFound,
            Self::Contract(_) => ErrorCategory::Contract,
            Self::Registry(_) => ErrorCategory::Registry,
            Self::Handler { .. } => ErrorCategory::Handler,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }

    /// Message placed in the envelope's `error` field.
    ///
    /// Contract and registry failures are server bugs or outages; their
    /// details go to the logs and clients see a generic message.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Contract(_) | Self::Registry(_) => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    /// Converts this error to its wire envelope.
    #[must_use]
    pub fn to_envelope(&self) -> ErrorEnvelope {
        let errors = match self {
            Self::Validation { errors } => errors.clone(),
            _ => Vec::new(),
        };
        ErrorEnvelope {
            success: false,
            error: self.client_message(),
            errors,
        }
    }
}

/// Serializable error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always `false`.
    pub success: bool,
    /// Human-readable summary.
    pub error: String,
    /// Field errors; only present for validation failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validation_envelope_lists_every_error() {
        let error = SluiceError::validation(vec![
            FieldError::required("name"),
            FieldError::new("age", Constraint::Type, json!("abc")),
        ]);
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);

        let body = serde_json::to_value(error.to_envelope()).unwrap();
        assert_eq!(
            body,
            json!({
                "success": false,
                "error": "Validation failed",
                "errors": [
                    { "field": "name", "constraint": "required", "value": null },
                    { "field": "age", "constraint": "type", "value": "abc" }
                ]
            })
        );
    }

    #[test]
    fn test_handler_envelope_has_no_errors_key() {
        let error = SluiceError::handler("database unavailable", None);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = serde_json::to_value(error.to_envelope()).unwrap();
        assert_eq!(body, json!({ "success": false, "error": "database unavailable" }));
    }

    #[test]
    fn test_contract_error_hides_details_from_clients() {
        let error = SluiceError::from(ShapeError::MissingField {
            status: 201,
            field: "id".to_string(),
        });
        assert_eq!(error.category(), ErrorCategory::Contract);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.to_envelope().error, "Internal Server Error");
        assert!(error.to_string().contains("'id'"));
    }

    #[test]
    fn test_registry_error_maps_to_500() {
        let error = SluiceError::from(RegistryError::NotRegistered {
            name: "db".to_string(),
        });
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error.to_string().contains("'db'"));
    }

    #[test]
    fn test_not_found_and_timeout_status() {
        assert_eq!(SluiceError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(SluiceError::NotFound.to_envelope().error, "Not Found");
        assert_eq!(
            SluiceError::timeout("Handler execution timed out").status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_constraint_wire_names() {
        for (constraint, name) in [
            (Constraint::Required, "\"required\""),
            (Constraint::Type, "\"type\""),
            (Constraint::Min, "\"min\""),
            (Constraint::Max, "\"max\""),
            (Constraint::Format, "\"format\""),
        ] {
            assert_eq!(serde_json::to_string(&constraint).unwrap(), name);
        }
    }

    #[test]
    fn test_schema_error_messages_name_the_field() {
        let err = SchemaError::MinGreaterThanMax {
            field: "age".to_string(),
            min: 10.0,
            max: 1.0,
        };
        assert!(err.to_string().contains("'age'"));

        let err = SchemaError::UnknownType {
            field: "when".to_string(),
            type_name: "date".to_string(),
        };
        assert!(err.to_string().contains("'date'"));
    }
}
