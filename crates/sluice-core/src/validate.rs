//! Schema Validator.
//!
//! [`validate`] checks one input surface against a [`SchemaMap`]:
//!
//! 1. Missing required fields produce a single `required` error each.
//!    Missing optional fields are omitted. No defaults are injected.
//! 2. Present fields are coerced to their declared type.
//! 3. Coerced values are checked against `min`/`max`.
//! 4. Undeclared fields are dropped (allow-list).
//!
//! Errors from different fields accumulate; validation never stops at the
//! first failure.

use serde_json::{Map, Number, Value};

use crate::error::{Constraint, FieldError};
use crate::schema::{FieldSchema, FieldType, SchemaMap};

/// A key/value input surface.
pub type Input = Map<String, Value>;

/// Validates `input` against `schema`.
///
/// Returns the coerced, allow-listed fields, or every field error found.
/// JSON `null` is treated the same as an absent field.
///
/// # Errors
///
/// Returns the list of [`FieldError`]s, one per failing field, in field-name
/// order.
///
/// # Example
///
/// ```
/// use sluice_core::{validate, FieldSchema, SchemaMap};
/// use serde_json::json;
///
/// let schema = SchemaMap::new()
///     .field("name", FieldSchema::string().required().min(2))
///     .field("age", FieldSchema::number());
///
/// let input = json!({ "name": "Al", "extra": true });
/// let output = validate(input.as_object().unwrap(), &schema).unwrap();
///
/// assert_eq!(serde_json::Value::Object(output), json!({ "name": "Al" }));
/// ```
pub fn validate(input: &Input, schema: &SchemaMap) -> Result<Input, Vec<FieldError>> {
    let mut output = Map::new();
    let mut errors = Vec::new();

    for (name, field) in schema {
        match input.get(name).filter(|value| !value.is_null()) {
            None if field.is_required() => errors.push(FieldError::required(name)),
            None => {}
            Some(raw) => match check_field(field, raw) {
                Ok(value) => {
                    output.insert(name.clone(), value);
                }
                Err(constraint) => errors.push(FieldError::new(name, constraint, raw.clone())),
            },
        }
    }

    if errors.is_empty() {
        Ok(output)
    } else {
        Err(errors)
    }
}

/// Coerces and bounds-checks a single present value.
fn check_field(field: &FieldSchema, raw: &Value) -> Result<Value, Constraint> {
    let value = coerce(field.field_type(), raw)?;
    check_bounds(field, &value)?;
    Ok(value)
}

/// Converts a raw value into the declared type when unambiguous.
fn coerce(field_type: FieldType, raw: &Value) -> Result<Value, Constraint> {
    match (field_type, raw) {
        (FieldType::String | FieldType::Object | FieldType::Boolean, _)
            if same_kind(field_type, raw) =>
        {
            Ok(raw.clone())
        }
        (FieldType::Number, Value::Number(n)) if n.as_f64().is_some_and(f64::is_finite) => {
            Ok(raw.clone())
        }
        (FieldType::Number, Value::String(s)) => parse_number(s).ok_or(Constraint::Type),
        (FieldType::Boolean, Value::String(s)) => match s.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(Constraint::Type),
        },
        (FieldType::Email, Value::String(s)) => {
            if is_plausible_email(s) {
                Ok(raw.clone())
            } else {
                Err(Constraint::Format)
            }
        }
        _ => Err(Constraint::Type),
    }
}

fn same_kind(field_type: FieldType, raw: &Value) -> bool {
    matches!(
        (field_type, raw),
        (FieldType::String, Value::String(_))
            | (FieldType::Object, Value::Object(_))
            | (FieldType::Boolean, Value::Bool(_))
    )
}

/// Parses a numeric-looking string. Integers stay integral.
fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Number(Number::from(i)));
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Format check only: one `@`, non-empty local part and domain, no whitespace.
fn is_plausible_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    match s.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

fn check_bounds(field: &FieldSchema, value: &Value) -> Result<(), Constraint> {
    let measure = match value {
        Value::String(s) if field.field_type().is_textual() => s.chars().count() as f64,
        Value::Number(n) => match n.as_f64() {
            Some(f) => f,
            None => return Ok(()),
        },
        _ => return Ok(()),
    };

    if field.min_bound().is_some_and(|min| measure < min) {
        return Err(Constraint::Min);
    }
    if field.max_bound().is_some_and(|max| measure > max) {
        return Err(Constraint::Max);
    }
    Ok(())
}
