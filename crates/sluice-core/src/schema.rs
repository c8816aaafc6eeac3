//! Declarative field schemas.
//!
//! A [`SchemaMap`] describes one input surface (query, body or path params) or
//! one response status. Each entry is a [`FieldSchema`]: a type from a closed
//! set, a `required` flag, and optional `min`/`max` bounds.
//!
//! Schemas can be built in code:
//!
//! ```
//! use sluice_core::{FieldSchema, SchemaMap};
//!
//! let schema = SchemaMap::new()
//!     .field("name", FieldSchema::string().required().min(2))
//!     .field("age", FieldSchema::number().min(0).max(150));
//!
//! assert!(schema.check().is_ok());
//! ```
//!
//! or loaded from JSON, in which case unknown types are reported as
//! [`SchemaError::UnknownType`]:
//!
//! ```
//! use sluice_core::SchemaMap;
//! use serde_json::json;
//!
//! let schema = SchemaMap::from_value(json!({
//!     "email": { "type": "email", "required": true },
//!     "age": { "type": "number", "min": 18 }
//! }))
//! .unwrap();
//!
//! assert_eq!(schema.len(), 2);
//! ```

use std::collections::btree_map::{self, BTreeMap};
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Constraint, SchemaError};

/// The closed set of field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Any string. Bounds apply to character length.
    String,
    /// A number, or a string that parses as one. Bounds are inclusive values.
    Number,
    /// A boolean, or the strings `"true"` / `"false"`.
    Boolean,
    /// A string shaped like `local@domain`. Bounds apply to character length.
    Email,
    /// A JSON object. No bounds.
    Object,
}

impl FieldType {
    /// Parses a wire type name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "email" => Some(Self::Email),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    /// Returns the wire type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Email => "email",
            Self::Object => "object",
        }
    }

    /// Whether `min`/`max` measure character length for this type.
    #[must_use]
    pub const fn is_textual(self) -> bool {
        matches!(self, Self::String | Self::Email)
    }

    /// Whether `min`/`max` may be declared for this type.
    #[must_use]
    pub const fn supports_bounds(self) -> bool {
        matches!(self, Self::String | Self::Email | Self::Number)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validation rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    field_type: FieldType,
    required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<f64>,
}

impl FieldSchema {
    /// Creates an optional, unbounded field of the given type.
    #[must_use]
    pub const fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            min: None,
            max: None,
        }
    }

    /// Shorthand for `FieldSchema::new(FieldType::String)`.
    #[must_use]
    pub const fn string() -> Self {
        Self::new(FieldType::String)
    }

    /// Shorthand for `FieldSchema::new(FieldType::Number)`.
    #[must_use]
    pub const fn number() -> Self {
        Self::new(FieldType::Number)
    }

    /// Shorthand for `FieldSchema::new(FieldType::Boolean)`.
    #[must_use]
    pub const fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    /// Shorthand for `FieldSchema::new(FieldType::Email)`.
    #[must_use]
    pub const fn email() -> Self {
        Self::new(FieldType::Email)
    }

    /// Shorthand for `FieldSchema::new(FieldType::Object)`.
    #[must_use]
    pub const fn object() -> Self {
        Self::new(FieldType::Object)
    }

    /// Marks the field as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the lower bound (length for text, value for numbers).
    #[must_use]
    pub fn min(mut self, min: impl Into<f64>) -> Self {
        self.min = Some(min.into());
        self
    }

    /// Sets the upper bound (length for text, value for numbers).
    #[must_use]
    pub fn max(mut self, max: impl Into<f64>) -> Self {
        self.max = Some(max.into());
        self
    }

    /// Returns the declared type.
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Returns `true` if the field must be present.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Returns the lower bound, if any.
    #[must_use]
    pub const fn min_bound(&self) -> Option<f64> {
        self.min
    }

    /// Returns the upper bound, if any.
    #[must_use]
    pub const fn max_bound(&self) -> Option<f64> {
        self.max
    }

    /// Checks the schema's own invariants.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if bounds are non-finite, negative for a textual
    /// type, declared on a type without bounds, or `min > max`.
    pub fn check(&self, field: &str) -> Result<(), SchemaError> {
        for (bound, constraint) in [(self.min, Constraint::Min), (self.max, Constraint::Max)] {
            let Some(bound) = bound else { continue };

            if !self.field_type.supports_bounds() {
                return Err(SchemaError::UnsupportedConstraint {
                    field: field.to_string(),
                    field_type: self.field_type,
                    constraint,
                });
            }
            if !bound.is_finite() {
                return Err(SchemaError::NonFiniteBound {
                    field: field.to_string(),
                });
            }
            if self.field_type.is_textual() && bound < 0.0 {
                return Err(SchemaError::NegativeLength {
                    field: field.to_string(),
                    bound,
                });
            }
        }

        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(SchemaError::MinGreaterThanMax {
                    field: field.to_string(),
                    min,
                    max,
                });
            }
        }

        Ok(())
    }
}

/// Wire form of a field schema, with the type still as a string.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFieldSchema {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

/// Mapping from field name to [`FieldSchema`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SchemaMap {
    fields: BTreeMap<String, FieldSchema>,
}

impl SchemaMap {
    /// Creates an empty schema map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, replacing any previous definition with the same name.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.insert(name, schema);
        self
    }

    /// Inserts a field, replacing any previous definition with the same name.
    pub fn insert(&mut self, name: impl Into<String>, schema: FieldSchema) {
        self.fields.insert(name.into(), schema);
    }

    /// Parses a schema map from a JSON object of field definitions.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Malformed`] for documents that are not a map of
    /// field definitions, [`SchemaError::UnknownType`] for types outside the
    /// closed set, and any error from [`SchemaMap::check`].
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let raw: HashMap<String, RawFieldSchema> =
            serde_json::from_value(value).map_err(|e| SchemaError::Malformed(e.to_string()))?;

        let mut schema = Self::new();
        for (name, raw) in raw {
            let field_type =
                FieldType::parse(&raw.type_name).ok_or_else(|| SchemaError::UnknownType {
                    field: name.clone(),
                    type_name: raw.type_name.clone(),
                })?;
            let field = FieldSchema {
                field_type,
                required: raw.required,
                min: raw.min,
                max: raw.max,
            };
            field.check(&name)?;
            schema.insert(name, field);
        }
        Ok(schema)
    }

    /// Returns the schema for a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    /// Returns `true` if the field is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldSchema> {
        self.fields.iter()
    }

    /// Iterates field names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns the number of declared fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no fields are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Checks every field's invariants.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found, in field-name order.
    pub fn check(&self) -> Result<(), SchemaError> {
        self.fields
            .iter()
            .try_for_each(|(name, schema)| schema.check(name))
    }
}

impl<K: Into<String>> FromIterator<(K, FieldSchema)> for SchemaMap {
    fn from_iter<I: IntoIterator<Item = (K, FieldSchema)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SchemaMap {
    type Item = (&'a String, &'a FieldSchema);
    type IntoIter = btree_map::Iter<'a, String, FieldSchema>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// The request-side schemas of one registration, one per input surface.
///
/// Surfaces without a schema are not validated and are absent from the
/// handler's validated view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestSchemas {
    query: Option<SchemaMap>,
    body: Option<SchemaMap>,
    params: Option<SchemaMap>,
}

impl RequestSchemas {
    /// Creates an empty set of request schemas.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the query-string schema.
    #[must_use]
    pub fn query(mut self, schema: SchemaMap) -> Self {
        self.query = Some(schema);
        self
    }

    /// Declares the JSON body schema.
    #[must_use]
    pub fn body(mut self, schema: SchemaMap) -> Self {
        self.body = Some(schema);
        self
    }

    /// Declares the path-parameter schema.
    #[must_use]
    pub fn params(mut self, schema: SchemaMap) -> Self {
        self.params = Some(schema);
        self
    }

    /// Returns the query schema, if declared.
    #[must_use]
    pub fn query_schema(&self) -> Option<&SchemaMap> {
        self.query.as_ref()
    }

    /// Returns the body schema, if declared.
    #[must_use]
    pub fn body_schema(&self) -> Option<&SchemaMap> {
        self.body.as_ref()
    }

    /// Returns the params schema, if declared.
    #[must_use]
    pub fn params_schema(&self) -> Option<&SchemaMap> {
        self.params.as_ref()
    }

    /// Returns `true` if no surface declares a schema.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.query.is_none() && self.body.is_none() && self.params.is_none()
    }

    /// Checks every declared surface.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found.
    pub fn check(&self) -> Result<(), SchemaError> {
        [&self.query, &self.body, &self.params]
            .into_iter()
            .flatten()
            .try_for_each(SchemaMap::check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_sets_constraints() {
        let schema = FieldSchema::string().required().min(2).max(10);
        assert_eq!(schema.field_type(), FieldType::String);
        assert!(schema.is_required());
        assert_eq!(schema.min_bound(), Some(2.0));
        assert_eq!(schema.max_bound(), Some(10.0));
    }

    #[test]
    fn test_optional_by_default() {
        assert!(!FieldSchema::number().is_required());
    }

    #[test]
    fn test_min_greater_than_max_fails() {
        let err = FieldSchema::number().min(5).max(1).check("age").unwrap_err();
        assert!(matches!(err, SchemaError::MinGreaterThanMax { ref field, .. } if field == "age"));
    }

    #[test]
    fn test_equal_bounds_are_valid() {
        assert!(FieldSchema::string().min(3).max(3).check("code").is_ok());
    }

    #[test]
    fn test_negative_length_fails() {
        let err = FieldSchema::string().min(-1).check("name").unwrap_err();
        assert!(matches!(err, SchemaError::NegativeLength { .. }));
    }

    #[test]
    fn test_negative_numeric_bound_is_valid() {
        assert!(FieldSchema::number().min(-273.15).check("celsius").is_ok());
    }

    #[test]
    fn test_bounds_on_boolean_fail() {
        let err = FieldSchema::boolean().max(1).check("flag").unwrap_err();
        assert!(matches!(
            err,
            SchemaError::UnsupportedConstraint {
                constraint: Constraint::Max,
                field_type: FieldType::Boolean,
                ..
            }
        ));
    }

    #[test]
    fn test_non_finite_bound_fails() {
        let err = FieldSchema::number().max(f64::NAN).check("x").unwrap_err();
        assert!(matches!(err, SchemaError::NonFiniteBound { .. }));
    }

    #[test]
    fn test_from_value_parses_all_types() {
        let schema = SchemaMap::from_value(json!({
            "name": { "type": "string", "required": true, "min": 2 },
            "age": { "type": "number" },
            "active": { "type": "boolean" },
            "email": { "type": "email" },
            "meta": { "type": "object" }
        }))
        .unwrap();

        assert_eq!(schema.len(), 5);
        assert!(schema.get("name").unwrap().is_required());
        assert_eq!(schema.get("meta").unwrap().field_type(), FieldType::Object);
    }

    #[test]
    fn test_from_value_rejects_unknown_type() {
        let err = SchemaMap::from_value(json!({ "when": { "type": "date" } })).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownType {
                field: "when".to_string(),
                type_name: "date".to_string()
            }
        );
    }

    #[test]
    fn test_from_value_rejects_invalid_bounds() {
        let err =
            SchemaMap::from_value(json!({ "n": { "type": "number", "min": 9, "max": 1 } }))
                .unwrap_err();
        assert!(matches!(err, SchemaError::MinGreaterThanMax { .. }));
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        let err = SchemaMap::from_value(json!(["name"])).unwrap_err();
        assert!(matches!(err, SchemaError::Malformed(_)));
    }

    #[test]
    fn test_from_value_rejects_unknown_keys() {
        let err = SchemaMap::from_value(json!({ "n": { "type": "number", "default": 3 } }))
            .unwrap_err();
        assert!(matches!(err, SchemaError::Malformed(_)));
    }

    #[test]
    fn test_schema_map_serializes_like_its_wire_form() {
        let schema = SchemaMap::new().field("name", FieldSchema::string().required().min(2));
        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({ "name": { "type": "string", "required": true, "min": 2.0 } })
        );
    }

    #[test]
    fn test_request_schemas_check_every_surface() {
        let schemas = RequestSchemas::new()
            .query(SchemaMap::new().field("limit", FieldSchema::number().min(1)))
            .body(SchemaMap::new().field("name", FieldSchema::string().min(4).max(2)));
        assert!(schemas.check().is_err());
        assert!(!schemas.is_empty());
        assert!(RequestSchemas::new().is_empty());
    }
}
