//! Typed configuration for Iris services.
//!
//! Supports:
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env → deployment variables)
//!
//! # Overview
//!
//! [`IrisConfig`] groups every section a service process reads:
//!
//! - [`ServerConfig`] - Inbound HTTP server (address, timeouts)
//! - [`RegistryConfig`] - Shared service registry location and retry policy
//! - [`SessionConfig`] - Whether sessions are required and where they live
//! - [`QueueConfig`] - Queue transport endpoint and static routes
//! - [`InterResourceConfig`] - Outbound call defaults (locale, timeouts)
//! - [`TelemetryConfigSection`] - Metrics and logging
//!
//! # Example
//!
//! ```no_run
//! use iris_config::ConfigLoader;
//!
//! # fn main() -> Result<(), iris_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("iris.toml")?
//!     .with_env_prefix("IRIS")
//!     .with_boundary_env()
//!     .load()?;
//!
//! println!("registry at {}", config.registry.addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! request_timeout_ms = 30000
//!
//! [registry]
//! addr = "127.0.0.1:8787"
//!
//! [queue]
//! endpoint = "amqp://localhost"
//!
//! [[queue.routes]]
//! resource = "Widget"
//! version = 1
//! queue_name = "service.widgets"
//! equivalent_path = "/v1/widgets"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables, e.g.
//! `IRIS__SERVER__HTTP_ADDR=0.0.0.0:9000` or
//! `IRIS__TELEMETRY__LOGGING__LEVEL=debug`. The deployment variables
//! `IRIS_REGISTRY_PORT`, `IRIS_QUEUE_ENDPOINT` and `IRIS_SESSION_STORE_URI`
//! are honoured when [`ConfigLoader::with_boundary_env`] is used.

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::{ConfigLoader, QUEUE_ENDPOINT_VAR, REGISTRY_PORT_VAR, SESSION_STORE_URI_VAR};
pub use schema::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IrisConfig::default();
        assert_eq!(config.server.shutdown_timeout_secs, 30);
        assert!(config.registry.enabled);
        assert!(!config.queue.is_active());
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = IrisConfig::production();
        let text = toml::to_string(&config).unwrap();
        let parsed: IrisConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
