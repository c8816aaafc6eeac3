//! Configuration sections.
//!
//! Every section denies unknown fields and fills missing ones from its
//! `Default`, so a file only needs the keys it changes.

use serde::{Deserialize, Serialize};
use sluice_server::{
    DEFAULT_HTTP_ADDR, DEFAULT_MAX_BODY_BYTES, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
use sluice_telemetry::LogFormat;

/// `[server]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Bind address, `host:port`.
    pub http_addr: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds.
    pub shutdown_timeout_secs: u64,
    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Whether a subscriber is installed.
    pub enabled: bool,
    /// Filter directive, e.g. `info` or `sluice_route=debug,info`.
    pub level: String,
    /// `json` or `pretty`.
    pub format: LogFormat,
    /// Include file and line in events.
    pub include_location: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
            include_location: false,
        }
    }
}

/// `[metrics]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsSection {
    /// Whether the Prometheus recorder is installed.
    pub enabled: bool,
    /// Standalone scrape listener address. Without it, metrics are served
    /// at `/metrics` on the main port.
    pub addr: Option<String>,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: None,
        }
    }
}

/// `[service]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSection {
    /// Service name, reported by `/health`.
    pub name: String,
    /// Service version, reported by `/health`.
    pub version: String,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: "sluice".to_string(),
            version: "0.0.0".to_string(),
        }
    }
}
