//! Main configuration types.
//!
//! This module provides the top-level [`IrisConfig`] struct and its builder.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{
    ConfigError, InterResourceConfig, LogFormat, QueueConfig, RegistryConfig, ServerConfig,
    SessionConfig, TelemetryConfigSection,
};

/// Complete configuration of an Iris service process.
///
/// # Example
///
/// ```
/// use iris_config::IrisConfig;
///
/// let config = IrisConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert_eq!(config.registry.addr, "127.0.0.1:8787");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct IrisConfig {
    /// Inbound server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Service registry configuration.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Queue transport configuration.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Inter-resource call configuration.
    #[serde(default)]
    pub inter_resource: InterResourceConfig,

    /// Telemetry configuration (metrics, logging).
    #[serde(default)]
    pub telemetry: TelemetryConfigSection,
}

impl IrisConfig {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```
    /// use iris_config::{IrisConfig, ServerConfig};
    ///
    /// let config = IrisConfig::builder()
    ///     .server(ServerConfig {
    ///         http_addr: "127.0.0.1:3000".to_string(),
    ///         ..Default::default()
    ///     })
    ///     .build();
    ///
    /// assert_eq!(config.server.http_addr, "127.0.0.1:3000");
    /// ```
    #[must_use]
    pub fn builder() -> IrisConfigBuilder {
        IrisConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if:
    /// - Server, registry or metrics addresses are invalid
    /// - A timeout is zero
    /// - Queue routes are duplicated or incomplete
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .server
            .http_addr
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        if self.registry.enabled && self.registry.addr.rsplit_once(':').is_none() {
            return Err(ConfigError::invalid_value(
                "registry.addr",
                format!("expected host:port, got {}", self.registry.addr),
            ));
        }

        if self.registry.retry_initial_ms == 0
            || self.registry.retry_max_ms < self.registry.retry_initial_ms
        {
            return Err(ConfigError::invalid_value(
                "registry.retry_initial_ms",
                "must be positive and not exceed registry.retry_max_ms",
            ));
        }

        for (field, value) in [
            ("server.request_timeout_ms", self.server.request_timeout_ms),
            (
                "inter_resource.http_timeout_ms",
                self.inter_resource.http_timeout_ms,
            ),
            (
                "inter_resource.queue_timeout_ms",
                self.inter_resource.queue_timeout_ms,
            ),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid_value(field, "must be positive"));
            }
        }

        if self.inter_resource.max_local_connections == 0 {
            return Err(ConfigError::invalid_value(
                "inter_resource.max_local_connections",
                "must be positive",
            ));
        }

        if self.telemetry.metrics.enabled
            && self
                .telemetry
                .metrics
                .addr
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            return Err(ConfigError::invalid_value(
                "telemetry.metrics.addr",
                format!("invalid socket address: {}", self.telemetry.metrics.addr),
            ));
        }

        let mut seen = HashSet::new();
        for route in &self.queue.routes {
            if route.queue_name.is_empty() || route.equivalent_path.is_empty() {
                return Err(ConfigError::invalid_value(
                    "queue.routes",
                    format!("route for {} v{} is incomplete", route.resource, route.version),
                ));
            }
            if !seen.insert((route.resource.as_str(), route.version)) {
                return Err(ConfigError::validation_error(format!(
                    "multiple queue routes for {} v{}",
                    route.resource, route.version
                )));
            }
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// Pretty, debug-level logs and no session requirement.
    ///
    /// # Example
    ///
    /// ```
    /// use iris_config::{IrisConfig, LogFormat};
    ///
    /// let config = IrisConfig::development();
    /// assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    /// assert!(!config.session.require_session);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.server.http_addr = "127.0.0.1:8080".to_string();
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.ansi_enabled = true;
        config
    }

    /// Create a production configuration preset.
    ///
    /// JSON logs, metrics enabled and sessions required.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.metrics.enabled = true;
        config.session.require_session = true;
        config
    }

    /// Returns `true` if requests must carry a session.
    #[must_use]
    pub fn sessions_required(&self) -> bool {
        self.session.require_session || self.session.store_uri.is_some()
    }
}

/// Builder for [`IrisConfig`].
#[derive(Debug, Default)]
pub struct IrisConfigBuilder {
    config: IrisConfig,
}

impl IrisConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server configuration.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.config.server = server;
        self
    }

    /// Set the registry configuration.
    #[must_use]
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.config.registry = registry;
        self
    }

    /// Set the session configuration.
    #[must_use]
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.config.session = session;
        self
    }

    /// Set the queue configuration.
    #[must_use]
    pub fn queue(mut self, queue: QueueConfig) -> Self {
        self.config.queue = queue;
        self
    }

    /// Set the inter-resource configuration.
    #[must_use]
    pub fn inter_resource(mut self, inter_resource: InterResourceConfig) -> Self {
        self.config.inter_resource = inter_resource;
        self
    }

    /// Set the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfigSection) -> Self {
        self.config.telemetry = telemetry;
        self
    }

    /// Build the configuration without validating it.
    #[must_use]
    pub fn build(self) -> IrisConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QueueRouteConfig;

    #[test]
    fn test_default_validates() {
        IrisConfig::default().validate().unwrap();
        IrisConfig::development().validate().unwrap();
        IrisConfig::production().validate().unwrap();
    }

    #[test]
    fn test_invalid_server_addr() {
        let mut config = IrisConfig::default();
        config.server.http_addr = "not-an-addr".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "server.http_addr"
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = IrisConfig::default();
        config.inter_resource.http_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_queue_routes_rejected() {
        let route = QueueRouteConfig {
            resource: "Widget".into(),
            version: 1,
            queue_name: "service.widgets".into(),
            equivalent_path: "/v1/widgets".into(),
        };
        let mut config = IrisConfig::default();
        config.queue.routes = vec![route.clone(), route];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_sessions_required_by_store_uri() {
        let mut config = IrisConfig::default();
        assert!(!config.sessions_required());
        config.session.store_uri = Some("memory://sessions".into());
        assert!(config.sessions_required());
    }
}
