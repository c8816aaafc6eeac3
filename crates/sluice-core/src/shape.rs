//! Response Shaper.
//!
//! Handlers may build over-broad payloads. Before a payload leaves the
//! process it is filtered down to the fields declared for its status code.
//! Codes with no declared schema pass through untouched.

use std::collections::HashMap;

use http::StatusCode;
use serde_json::{Map, Value};

use crate::error::{SchemaError, ShapeError};
use crate::schema::SchemaMap;

/// Declared response schemas, keyed by status code.
///
/// # Example
///
/// ```
/// use http::StatusCode;
/// use sluice_core::{FieldSchema, ResponseSchemas, SchemaMap};
///
/// let responses = ResponseSchemas::new().status(
///     StatusCode::CREATED,
///     SchemaMap::new()
///         .field("id", FieldSchema::string().required())
///         .field("name", FieldSchema::string().required()),
/// );
///
/// assert!(responses.get(StatusCode::CREATED).is_some());
/// assert!(responses.get(StatusCode::NOT_FOUND).is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResponseSchemas {
    by_status: HashMap<u16, SchemaMap>,
}

impl ResponseSchemas {
    /// Creates an empty set; every status passes through.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the schema for `status`, replacing any earlier declaration.
    pub fn status(mut self, status: StatusCode, schema: SchemaMap) -> Self {
        self.by_status.insert(status.as_u16(), schema);
        self
    }

    /// Returns the schema declared for `status`.
    #[must_use]
    pub fn get(&self, status: StatusCode) -> Option<&SchemaMap> {
        self.by_status.get(&status.as_u16())
    }

    /// Returns the declared status codes in ascending order.
    #[must_use]
    pub fn statuses(&self) -> Vec<StatusCode> {
        let mut codes: Vec<StatusCode> = self
            .by_status
            .keys()
            .filter_map(|code| StatusCode::from_u16(*code).ok())
            .collect();
        codes.sort_unstable();
        codes
    }

    /// Returns `true` if no status has a schema.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_status.is_empty()
    }

    /// Checks the invariants of every declared schema.
    pub fn check(&self) -> Result<(), SchemaError> {
        self.by_status.values().try_for_each(SchemaMap::check)
    }
}

/// Shapes `payload` for the given `status`.
///
/// Required declared fields must be present and non-null. Undeclared fields
/// are dropped and declared values are copied verbatim.
///
/// # Errors
///
/// - [`ShapeError::MissingField`] if a required declared field is absent
/// - [`ShapeError::NotAnObject`] if a schema is declared but the payload is
///   not a JSON object
pub fn shape(
    status: StatusCode,
    payload: Value,
    responses: &ResponseSchemas,
) -> Result<Value, ShapeError> {
    let Some(schema) = responses.get(status) else {
        return Ok(payload);
    };

    let Value::Object(mut fields) = payload else {
        return Err(ShapeError::NotAnObject {
            status: status.as_u16(),
            kind: kind_of(&payload),
        });
    };

    let mut shaped = Map::new();
    for (name, field) in schema {
        match fields.remove(name) {
            Some(Value::Null) | None if field.is_required() => {
                return Err(ShapeError::MissingField {
                    status: status.as_u16(),
                    field: name.clone(),
                });
            }
            Some(value) => {
                shaped.insert(name.clone(), value);
            }
            None => {}
        }
    }

    Ok(Value::Object(shaped))
}

const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSchema;
    use proptest::prelude::*;
    use serde_json::json;

    fn user_responses() -> ResponseSchemas {
        ResponseSchemas::new().status(
            StatusCode::CREATED,
            SchemaMap::new()
                .field("id", FieldSchema::string().required())
                .field("name", FieldSchema::string().required())
                .field("email", FieldSchema::email().required())
                .field("createdAt", FieldSchema::string().required()),
        )
    }

    #[test]
    fn test_created_response_drops_undeclared_field() {
        let payload = json!({
            "id": "u1",
            "name": "Alice",
            "email": "alice@example.com",
            "age": 30,
            "createdAt": "2024-01-01T00:00:00Z"
        });

        let shaped = shape(StatusCode::CREATED, payload, &user_responses()).unwrap();

        assert_eq!(
            shaped,
            json!({
                "id": "u1",
                "name": "Alice",
                "email": "alice@example.com",
                "createdAt": "2024-01-01T00:00:00Z"
            })
        );
    }

    #[test]
    fn test_undeclared_status_passes_through() {
        let payload = json!({ "anything": [1, 2, 3], "nested": { "x": true } });
        let shaped = shape(StatusCode::NOT_FOUND, payload.clone(), &user_responses()).unwrap();
        assert_eq!(shaped, payload);

        let scalar = json!("not even an object");
        assert_eq!(
            shape(StatusCode::NOT_FOUND, scalar.clone(), &user_responses()).unwrap(),
            scalar
        );
    }

    #[test]
    fn test_missing_required_field() {
        let payload = json!({ "id": "u1", "name": "Alice", "email": "a@b" });
        let err = shape(StatusCode::CREATED, payload, &user_responses()).unwrap_err();
        assert_eq!(
            err,
            ShapeError::MissingField {
                status: 201,
                field: "createdAt".to_string(),
            }
        );
    }

    #[test]
    fn test_null_required_field_is_missing() {
        let payload = json!({ "id": "u1", "name": null, "email": "a@b", "createdAt": "t" });
        let err = shape(StatusCode::CREATED, payload, &user_responses()).unwrap_err();
        assert!(matches!(err, ShapeError::MissingField { field, .. } if field == "name"));
    }

    #[test]
    fn test_null_optional_field_is_kept() {
        let responses = ResponseSchemas::new().status(
            StatusCode::OK,
            SchemaMap::new()
                .field("name", FieldSchema::string().required())
                .field("nickname", FieldSchema::string()),
        );
        let payload = json!({ "name": "Al", "nickname": null, "age": 3 });
        let shaped = shape(StatusCode::OK, payload, &responses).unwrap();
        assert_eq!(shaped, json!({ "name": "Al", "nickname": null }));
    }

    #[test]
    fn test_values_are_not_coerced() {
        let responses = ResponseSchemas::new().status(
            StatusCode::OK,
            SchemaMap::new().field("count", FieldSchema::number().required()),
        );
        let shaped = shape(StatusCode::OK, json!({ "count": "7" }), &responses).unwrap();
        assert_eq!(shaped, json!({ "count": "7" }));
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        let err = shape(StatusCode::CREATED, json!([1, 2]), &user_responses()).unwrap_err();
        assert_eq!(
            err,
            ShapeError::NotAnObject {
                status: 201,
                kind: "array",
            }
        );
    }

    #[test]
    fn test_statuses_are_sorted() {
        let responses = user_responses()
            .status(StatusCode::OK, SchemaMap::new())
            .status(StatusCode::ACCEPTED, SchemaMap::new());
        assert_eq!(
            responses.statuses(),
            vec![StatusCode::OK, StatusCode::CREATED, StatusCode::ACCEPTED]
        );
    }

    proptest! {
        #[test]
        fn prop_shaping_is_idempotent(
            name in "[a-zA-Z ]{0,12}",
            extra_key in "[a-z]{1,6}",
            extra_value in any::<i32>(),
            include_optional in any::<bool>(),
        ) {
            let responses = ResponseSchemas::new().status(
                StatusCode::OK,
                SchemaMap::new()
                    .field("name", FieldSchema::string().required())
                    .field("nickname", FieldSchema::string()),
            );

            let mut payload = json!({ "name": name });
            payload[extra_key.as_str()] = json!(extra_value);
            if include_optional {
                payload["nickname"] = json!("nick");
            }

            let once = shape(StatusCode::OK, payload, &responses).unwrap();
            let twice = shape(StatusCode::OK, once.clone(), &responses).unwrap();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_undeclared_fields_never_leak(extra_key in "[a-z]{1,8}") {
            prop_assume!(!["id", "name", "email", "createdAt"].contains(&extra_key.as_str()));

            let mut payload = json!({
                "id": "u1",
                "name": "Alice",
                "email": "a@b",
                "createdAt": "now"
            });
            payload[extra_key.as_str()] = json!("secret");

            let shaped = shape(StatusCode::CREATED, payload, &user_responses()).unwrap();
            prop_assert!(shaped.get(&extra_key).is_none());
        }
    }
}
