//! Prometheus metrics for Sluice routes.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `sluice_requests_total` | Counter | `route`, `method`, `status` |
//! | `sluice_request_duration_seconds` | Histogram | `route`, `method` |
//! | `sluice_validation_failures_total` | Counter | `route`, `surface` |
//! | `sluice_in_flight_requests` | Gauge | - |
//!
//! Recording functions are safe to call before [`init_metrics`]; the
//! `metrics` facade drops observations when no recorder is installed.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Counter of dispatched requests.
pub const REQUESTS_TOTAL: &str = "sluice_requests_total";
/// Histogram of dispatch latency.
pub const REQUEST_DURATION: &str = "sluice_request_duration_seconds";
/// Counter of rejected inputs.
pub const VALIDATION_FAILURES: &str = "sluice_validation_failures_total";
/// Gauge of requests being served.
pub const IN_FLIGHT: &str = "sluice_in_flight_requests";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether a recorder is installed.
    pub enabled: bool,

    /// Optional address for a standalone scrape listener
    /// (e.g. `"0.0.0.0:9090"`). When `None`, metrics are only available
    /// through [`render_metrics`].
    pub addr: Option<String>,

    /// Buckets for the duration histogram, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: None,
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Installs the Prometheus recorder.
///
/// With an `addr`, the scrape listener is spawned on the current Tokio
/// runtime, so this must be called from within one.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidAddress`] for an unparsable address and
/// [`TelemetryError::MetricsInit`] if the recorder cannot be built or a
/// global recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let mut builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let recorder = match &config.addr {
        Some(addr) => {
            let addr: SocketAddr = addr
                .parse()
                .map_err(|e| TelemetryError::InvalidAddress(format!("{addr}: {e}")))?;
            builder = builder.with_http_listener(addr);
            let (recorder, exporter) = builder
                .build()
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
            tokio::spawn(async move {
                if let Err(e) = exporter.await {
                    tracing::error!(error = ?e, "metrics listener stopped");
                }
            });
            tracing::info!(%addr, "metrics listener started");
            recorder
        }
        None => builder.build_recorder(),
    };

    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|_| {
        TelemetryError::MetricsInit("a global metrics recorder is already installed".to_string())
    })?;
    let _ = METRICS_HANDLE.set(handle);

    describe_metrics();
    Ok(())
}

/// Renders current metrics in Prometheus text format.
///
/// Returns `None` if [`init_metrics`] has not installed a recorder.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total number of requests dispatched to routes");
    describe_histogram!(REQUEST_DURATION, "Route dispatch duration in seconds");
    describe_counter!(VALIDATION_FAILURES, "Requests rejected by input validation");
    describe_gauge!(IN_FLIGHT, "Requests currently being served");
}

/// Records one dispatched request.
pub fn record_request(route: &str, method: &str, status: u16, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        REQUEST_DURATION,
        "route" => route.to_string(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records a validation rejection for one input surface
/// (`query`, `body` or `params`).
pub fn record_validation_failure(route: &str, surface: &'static str) {
    counter!(
        VALIDATION_FAILURES,
        "route" => route.to_string(),
        "surface" => surface
    )
    .increment(1);
}

/// Tracks one in-flight request for as long as it is alive.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the in-flight gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(IN_FLIGHT).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert!(config.addr.is_none());
        assert_eq!(config.duration_buckets.len(), 12);
    }

    #[test]
    fn test_recording_without_recorder_does_not_panic() {
        record_request("users", "GET", 200, Duration::from_millis(3));
        record_validation_failure("users", "body");
        let guard = InFlightGuard::new();
        drop(guard);
    }

    #[test]
    fn test_disabled_metrics_is_a_no_op() {
        let config = MetricsConfig {
            enabled: false,
            ..MetricsConfig::default()
        };
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_invalid_address() {
        let config = MetricsConfig {
            addr: Some("not an address".to_string()),
            ..MetricsConfig::default()
        };
        assert!(matches!(
            init_metrics(&config),
            Err(TelemetryError::InvalidAddress(_))
        ));
    }
}
