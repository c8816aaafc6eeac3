//! # Sluice Core
//!
//! Core types for the Sluice routing layer.
//!
//! This crate holds everything a route needs that does not touch HTTP I/O:
//!
//! - [`FieldSchema`] / [`SchemaMap`] - Declarative per-field rules
//! - [`validate`] - Schema Validator with coercion and error aggregation
//! - [`shape`] - Response Shaper enforcing per-status response schemas
//! - [`ModuleRegistry`] - Lazily-resolved named modules shared across requests
//! - [`SluiceError`] - Error taxonomy and wire envelopes
//! - [`RequestContext`] - Per-request identity used for logs
//!
//! Validation and shaping are pure, synchronous functions over request-local
//! data. Only module resolution is async.

#![doc(html_root_url = "https://docs.rs/sluice-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
pub mod registry;
pub mod schema;
pub mod shape;
pub mod validate;

pub use context::{RequestContext, RequestId};
pub use error::{
    Constraint, ErrorCategory, ErrorEnvelope, FieldError, RegistryError, SchemaError, ShapeError,
    SluiceError, SluiceResult,
};
pub use registry::{ModuleRegistry, ModuleRegistryBuilder, Modules};
pub use schema::{FieldSchema, FieldType, RequestSchemas, SchemaMap};
pub use shape::{shape, ResponseSchemas};
pub use validate::{validate, Input};
