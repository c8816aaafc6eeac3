//! # Sluice Config
//!
//! Layered configuration for services built on Sluice.
//!
//! Layers, lowest first:
//!
//! 1. Built-in defaults ([`SluiceConfig::default`])
//! 2. A preset ([`SluiceConfig::development`] or [`SluiceConfig::production`])
//! 3. TOML or JSON files
//! 4. A `.env` file, loaded into the process environment
//! 5. `SLUICE__SECTION__KEY` environment variables
//!
//! The result is validated once, after every layer has been applied, and
//! converts into the server and telemetry settings.
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! request_timeout_secs = 30
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [metrics]
//! enabled = true
//!
//! [service]
//! name = "users"
//! version = "1.4.0"
//! ```

#![doc(html_root_url = "https://docs.rs/sluice-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod sections;

pub use config::SluiceConfig;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use sections::{LoggingSection, MetricsSection, ServerSection, ServiceSection};
