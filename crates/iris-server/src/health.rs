//! Health and readiness endpoints.
//!
//! - `/health` - liveness: the server is running, with the interfaces it
//!   hosts.
//! - `/ready` - readiness: false once shutdown has begun.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Health status returned by `/health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    /// Always `"healthy"` while the server answers.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_seconds: u64,
    /// Hosted interfaces as `Resource/vN`, sorted.
    pub interfaces: Vec<String>,
}

/// Liveness reporting for one server.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    service: String,
    version: String,
    started: Instant,
    interfaces: Vec<String>,
}

impl HealthCheck {
    /// Creates a health check for `service` at `version`.
    #[must_use]
    pub fn new(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            started: Instant::now(),
            interfaces: Vec::new(),
        }
    }

    /// Lists the hosted interfaces in the status.
    #[must_use]
    pub fn with_interfaces(mut self, interfaces: impl IntoIterator<Item = String>) -> Self {
        self.interfaces = interfaces.into_iter().collect();
        self.interfaces.sort();
        self
    }

    /// Time since the check was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            service: self.service.clone(),
            version: self.version.clone(),
            uptime_seconds: self.uptime().as_secs(),
            interfaces: self.interfaces.clone(),
        }
    }
}

/// Readiness flag, cleared when shutdown begins.
#[derive(Debug, Clone)]
pub struct ReadinessCheck {
    ready: Arc<AtomicBool>,
}

impl ReadinessCheck {
    /// Creates a ready check.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Sets readiness.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Returns `true` while the server accepts traffic.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

impl Default for ReadinessCheck {
    fn default() -> Self {
        Self::new()
    }
}
