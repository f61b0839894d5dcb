//! Structured logging for Iris services.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and a JSON
//! or pretty formatter, chosen from [`LoggingConfig`].
//!
//! Inter-resource calls log with the field names in [`fields`] so that one
//! call chain can be followed across services by `owning_interaction_id`.
//!
//! # Example
//!
//! ```rust,ignore
//! use iris_config::LoggingConfig;
//! use iris_telemetry::logging::{fields, init_logging};
//!
//! init_logging(&LoggingConfig::default())?;
//!
//! tracing::info!(resource = "Widget", action = "show", "Inter-resource call");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use iris_config::{LogFormat, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Initializes the logging subsystem.
///
/// `RUST_LOG` takes precedence over the configured level when set.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the level is not a valid filter
/// or a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => create_env_filter(&config.level)?,
    };

    match config.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(true)
                .with_filter(filter);

            tracing_subscriber::registry()
                .with(fmt_layer)
                .try_init()
                .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_ansi(config.ansi_enabled)
                .with_target(true)
                .with_filter(filter);

            tracing_subscriber::registry()
                .with(fmt_layer)
                .try_init()
                .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
        }
    }

    Ok(())
}

/// Creates an env filter from a string such as `"info"` or
/// `"iris_middleware=debug,hyper=warn"`.
///
/// # Errors
///
/// Returns error if the filter string is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::LoggingInit(format!("Invalid log level: {e}")))
}

/// Standard log field names.
pub mod fields {
    /// Interaction that started the call chain.
    pub const OWNING_INTERACTION_ID: &str = "owning_interaction_id";

    /// Interaction being handled or created.
    pub const INTERACTION_ID: &str = "interaction_id";

    /// Target resource name.
    pub const RESOURCE: &str = "resource";

    /// Target interface version.
    pub const VERSION: &str = "version";

    /// Resource action.
    pub const ACTION: &str = "action";

    /// Transport used for an inter-resource call.
    pub const TRANSPORT: &str = "transport";

    /// HTTP status code.
    pub const HTTP_STATUS: &str = "http.status_code";

    /// Duration in milliseconds.
    pub const DURATION_MS: &str = "duration_ms";

    /// Error description.
    pub const ERROR: &str = "error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names() {
        assert_eq!(fields::OWNING_INTERACTION_ID, "owning_interaction_id");
        assert_eq!(fields::TRANSPORT, "transport");
    }

    #[test]
    fn test_create_env_filter_valid() {
        assert!(create_env_filter("info").is_ok());
        assert!(create_env_filter("iris_middleware=debug,hyper=warn").is_ok());
    }

    #[test]
    fn test_create_env_filter_invalid() {
        assert!(create_env_filter("iris=verbose").is_err());
    }

    #[test]
    fn test_disabled_logging() {
        let config = LoggingConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(init_logging(&config).is_ok());
    }
}
