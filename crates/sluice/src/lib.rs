//! # Sluice
//!
//! **Schema-driven route validation, response shaping and module injection**
//!
//! Each route is declared once as a [`RouteContract`](route::RouteContract):
//! per-verb registrations carrying request schemas for the query, body and
//! path parameters, plus per-status response schemas. At request time the
//! dispatch wrapper:
//!
//! 1. Validates and coerces every declared input surface, reporting all
//!    field errors in one `400` envelope
//! 2. Hands the handler a view of the shared [`ModuleRegistry`](core::ModuleRegistry),
//!    whose modules are constructed lazily, at most once
//! 3. Shapes the handler's payload against the schema for the returned
//!    status, dropping undeclared fields
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sluice::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let users = RouteContract::new("users")
//!         .post_validated(
//!             RequestSchemas::new().body(
//!                 SchemaMap::new()
//!                     .field("name", FieldSchema::string().required().min(3))
//!                     .field("email", FieldSchema::email().required()),
//!             ),
//!             ResponseSchemas::new().status(
//!                 StatusCode::CREATED,
//!                 SchemaMap::new().field("name", FieldSchema::string().required()),
//!             ),
//!             |inv: Invocation| async move {
//!                 let body = inv.validated().body().cloned().unwrap_or_default();
//!                 Ok(Reply::created(serde_json::Value::Object(body)))
//!             },
//!         )
//!         .build()?;
//!
//!     Server::builder()
//!         .mount("/users", users)
//!         .build()
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/sluice/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use sluice_config as config;
pub use sluice_core as core;
pub use sluice_route as route;
pub use sluice_server as server;
pub use sluice_telemetry as telemetry;

/// Common imports.
///
/// ```rust
/// use sluice::prelude::*;
/// ```
pub mod prelude {
    pub use http::StatusCode;

    pub use sluice_config::{ConfigLoader, SluiceConfig};
    pub use sluice_core::{
        FieldSchema, FieldType, ModuleRegistry, Modules, RequestContext, RequestSchemas,
        ResponseSchemas, SchemaMap, SluiceError,
    };
    pub use sluice_route::{
        CompiledRoute, HandlerError, HandlerResult, Invocation, Reply, RouteContract,
    };
    pub use sluice_server::{Server, ServerConfig, ShutdownSignal};
    pub use sluice_telemetry::{init_telemetry, TelemetryConfig};
}
