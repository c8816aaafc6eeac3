//! # Sluice Server
//!
//! HTTP/1.1 hosting for compiled Sluice routes.
//!
//! The server matches the request path against mounted templates, builds
//! the raw request with captured path parameters and hands it to the
//! route's dispatch wrapper together with a view of the shared module
//! registry. It also provides:
//!
//! - `/health` and `/ready` probes
//! - `/metrics` when a Prometheus recorder is installed
//! - `x-request-id` propagation
//! - A per-request timeout (`504`) and a body size limit (`413`)
//! - Graceful shutdown on `SIGINT`/`SIGTERM`

#![doc(html_root_url = "https://docs.rs/sluice-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod health;
mod router;
mod server;
mod shutdown;

pub use config::{
    ServerConfig, ServerConfigBuilder, DEFAULT_HTTP_ADDR, DEFAULT_MAX_BODY_BYTES,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
pub use health::{HealthCheck, HealthStatus, ReadinessCheck, ReadinessStatus};
pub use router::{RouteMatch, Router};
pub use server::{HttpResponse, Server, ServerBuilder, ServerError, REQUEST_ID_HEADER};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
