//! Observability for Iris services.
//!
//! - **Logging**: structured JSON or pretty logs through `tracing-subscriber`
//! - **Metrics**: Prometheus-format metrics via the `metrics` crate
//!
//! # Metrics Endpoint
//!
//! When metrics are enabled the exporter serves the Prometheus text format:
//!
//! ```text
//! # TYPE iris_inter_resource_calls_total counter
//! iris_inter_resource_calls_total{transport="local",outcome="ok"} 12
//! iris_inter_resource_calls_total{transport="http",outcome="error"} 1
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use iris_config::IrisConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IrisConfig::development();
//!     iris_telemetry::init_telemetry(&config.telemetry)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{fields, init_logging};
pub use self::metrics::{
    init_metrics, record_inter_resource_call, record_registry_lookup, record_request,
    record_session_augmented, render_metrics,
};

use iris_config::TelemetryConfigSection;

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging, then metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if any subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfigSection) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    tracing::debug!(service = %config.service_name, "Telemetry initialized");
    Ok(())
}
