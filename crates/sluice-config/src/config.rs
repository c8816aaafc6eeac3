//! The root configuration type.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sluice_server::ServerConfig;
use sluice_telemetry::{LogConfig, LogFormat, MetricsConfig, TelemetryConfig};

use crate::sections::{LoggingSection, MetricsSection, ServerSection, ServiceSection};
use crate::ConfigError;

/// Complete service configuration.
///
/// ```
/// use sluice_config::SluiceConfig;
///
/// let config = SluiceConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct SluiceConfig {
    /// HTTP server settings.
    pub server: ServerSection,
    /// Logging settings.
    pub logging: LoggingSection,
    /// Metrics settings.
    pub metrics: MetricsSection,
    /// Service identity.
    pub service: ServiceSection,
}

impl SluiceConfig {
    /// Local development: pretty debug logs on localhost.
    #[must_use]
    pub fn development() -> Self {
        Self {
            server: ServerSection {
                http_addr: "127.0.0.1:8080".to_string(),
                ..ServerSection::default()
            },
            logging: LoggingSection {
                level: "debug".to_string(),
                format: LogFormat::Pretty,
                include_location: true,
                ..LoggingSection::default()
            },
            ..Self::default()
        }
    }

    /// Production: JSON logs at `info`.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Checks values that deserialize fine but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "server.request_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "must be greater than zero",
            ));
        }
        if let Some(addr) = &self.metrics.addr {
            if addr.parse::<SocketAddr>().is_err() {
                return Err(ConfigError::invalid_value(
                    "metrics.addr",
                    format!("invalid socket address: {addr}"),
                ));
            }
        }
        if self.service.name.trim().is_empty() {
            return Err(ConfigError::invalid_value("service.name", "must not be empty"));
        }
        Ok(())
    }

    /// Server settings for [`sluice_server::Server`].
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::builder()
            .http_addr(self.server.http_addr.clone())
            .request_timeout(Duration::from_secs(self.server.request_timeout_secs))
            .shutdown_timeout(Duration::from_secs(self.server.shutdown_timeout_secs))
            .max_body_bytes(self.server.max_body_bytes)
            .service(self.service.name.clone(), self.service.version.clone())
            .build()
    }

    /// Logging settings for [`sluice_telemetry::init_logging`].
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            enabled: self.logging.enabled,
            level: self.logging.level.clone(),
            format: self.logging.format,
            include_location: self.logging.include_location,
            ..LogConfig::default()
        }
    }

    /// Metrics settings for [`sluice_telemetry::init_metrics`].
    #[must_use]
    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            enabled: self.metrics.enabled,
            addr: self.metrics.addr.clone(),
            ..MetricsConfig::default()
        }
    }

    /// Both telemetry settings at once.
    #[must_use]
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            logging: self.log_config(),
            metrics: self.metrics_config(),
        }
    }
}
