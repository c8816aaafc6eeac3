//! Liveness and readiness probes served at `/health` and `/ready`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Body of `/health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    /// Always `"healthy"` while the process can answer.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Seconds since the server was built.
    pub uptime_seconds: u64,
}

/// Liveness probe.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    service: String,
    version: String,
    started_at: Instant,
}

impl HealthCheck {
    /// Creates a probe for the named service.
    #[must_use]
    pub fn new(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            started_at: Instant::now(),
        }
    }

    /// Time since creation.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            service: self.service.clone(),
            version: self.version.clone(),
            uptime_seconds: self.uptime().as_secs(),
        }
    }
}

/// Body of `/ready`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadinessStatus {
    /// `true` when every check passes and shutdown has not started.
    pub ready: bool,
    /// Result of each named check.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub checks: BTreeMap<String, bool>,
}

type ReadinessFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Readiness probe: a manual switch plus named checks.
///
/// ```rust
/// use sluice_server::ReadinessCheck;
///
/// let readiness = ReadinessCheck::new().add_check("store", || true);
/// assert!(readiness.is_ready());
///
/// readiness.set_ready(false);
/// assert!(!readiness.status().ready);
/// ```
#[derive(Clone)]
pub struct ReadinessCheck {
    checks: Vec<(String, ReadinessFn)>,
    ready: Arc<AtomicBool>,
}

impl std::fmt::Debug for ReadinessCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessCheck")
            .field("checks", &self.checks.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("ready", &self.ready.load(Ordering::SeqCst))
            .finish()
    }
}

impl ReadinessCheck {
    /// Creates a probe that is ready and has no checks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Adds a named check.
    #[must_use]
    pub fn add_check<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.checks.push((name.into(), Arc::new(check)));
        self
    }

    /// Flips the manual switch. The server clears it when shutdown starts.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Returns `true` if the switch is on and every check passes.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && self.checks.iter().all(|(_, check)| check())
    }

    /// Evaluates every check.
    #[must_use]
    pub fn status(&self) -> ReadinessStatus {
        let checks: BTreeMap<String, bool> = self
            .checks
            .iter()
            .map(|(name, check)| (name.clone(), check()))
            .collect();
        let ready = self.ready.load(Ordering::SeqCst) && checks.values().all(|ok| *ok);
        ReadinessStatus { ready, checks }
    }
}

impl Default for ReadinessCheck {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_health_status() {
        let status = HealthCheck::new("users", "1.0.0").status();
        assert_eq!(status.status, "healthy");
        assert_eq!(status.service, "users");
        assert_eq!(status.uptime_seconds, 0);
    }

    #[test]
    fn test_failing_check_reports_not_ready() {
        let readiness = ReadinessCheck::new()
            .add_check("store", || true)
            .add_check("cache", || false);
        let status = readiness.status();
        assert!(!status.ready);
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({ "ready": false, "checks": { "cache": false, "store": true } })
        );
    }

    #[test]
    fn test_switch_is_shared_between_clones() {
        let readiness = ReadinessCheck::new();
        let clone = readiness.clone();
        clone.set_ready(false);
        assert!(!readiness.is_ready());
        assert_eq!(serde_json::to_value(readiness.status()).unwrap(), json!({ "ready": false }));
    }
}
