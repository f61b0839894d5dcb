//! Prometheus metrics for Iris.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `iris_requests_total` | Counter | `action`, `status` | Inbound requests |
//! | `iris_request_duration_seconds` | Histogram | `action` | Inbound latency |
//! | `iris_inter_resource_calls_total` | Counter | `transport`, `outcome` | Outbound calls |
//! | `iris_inter_resource_call_duration_seconds` | Histogram | `transport` | Outbound latency |
//! | `iris_sessions_augmented_total` | Counter | - | Augmented sessions persisted |
//! | `iris_registry_lookups_total` | Counter | `outcome` | Registry lookups |
//!
//! Recording functions are no-ops until [`init_metrics`] installs a recorder.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use iris_config::MetricsConfig;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initializes the metrics subsystem and starts the Prometheus listener.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for a bad listener address and
/// `TelemetryError::MetricsInit` if no runtime is available or a recorder is
/// already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(addr)
        .build()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    runtime.spawn(async move {
        if let Err(e) = exporter.await {
            tracing::error!(error = ?e, "Prometheus exporter stopped");
        }
    });

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();

    tracing::info!(addr = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Renders metrics in Prometheus format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!("iris_requests_total", "Total number of inbound requests");
    describe_histogram!(
        "iris_request_duration_seconds",
        "Inbound request duration in seconds"
    );
    describe_counter!(
        "iris_inter_resource_calls_total",
        "Inter-resource calls by transport and outcome"
    );
    describe_histogram!(
        "iris_inter_resource_call_duration_seconds",
        "Inter-resource call duration in seconds"
    );
    describe_counter!(
        "iris_sessions_augmented_total",
        "Augmented sessions persisted for inter-resource calls"
    );
    describe_counter!(
        "iris_registry_lookups_total",
        "Service registry lookups by outcome"
    );
}

/// Records a completed inbound request.
pub fn record_request(action: &str, status_code: u16, duration: Duration) {
    counter!(
        "iris_requests_total",
        "action" => action.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(
        "iris_request_duration_seconds",
        "action" => action.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records a completed inter-resource call.
///
/// `outcome` is `"ok"` or `"error"`.
pub fn record_inter_resource_call(transport: &str, outcome: &str, duration: Duration) {
    counter!(
        "iris_inter_resource_calls_total",
        "transport" => transport.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        "iris_inter_resource_call_duration_seconds",
        "transport" => transport.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records a persisted augmented session.
pub fn record_session_augmented() {
    counter!("iris_sessions_augmented_total").increment(1);
}

/// Records a registry lookup: `"hit"`, `"miss"` or `"error"`.
pub fn record_registry_lookup(outcome: &str) {
    counter!(
        "iris_registry_lookups_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_dont_panic() {
        record_request("show", 200, Duration::from_millis(10));
        record_inter_resource_call("local", "ok", Duration::from_millis(3));
        record_session_augmented();
        record_registry_lookup("miss");
    }

    #[test]
    fn test_disabled_metrics_is_noop() {
        let config = MetricsConfig::default();
        assert!(!config.enabled);
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_invalid_address() {
        let config = MetricsConfig {
            enabled: true,
            addr: "not-an-address".to_string(),
        };
        assert!(matches!(
            init_metrics(&config),
            Err(TelemetryError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_requires_runtime() {
        let config = MetricsConfig {
            enabled: true,
            addr: "127.0.0.1:0".to_string(),
        };
        assert!(matches!(
            init_metrics(&config),
            Err(TelemetryError::MetricsInit(_))
        ));
    }
}
