//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use serde::{Deserialize, Serialize};

/// Inbound HTTP server configuration section.
///
/// # Example
///
/// ```
/// use iris_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "127.0.0.1:0".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.request_timeout_ms, 30000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// HTTP server bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Base URL announced to the service registry. Derived from the bound
    /// address when unset.
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            public_base_url: None,
            shutdown_timeout_secs: default_shutdown_timeout(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30000
}

/// Default registry port, overridable with `IRIS_REGISTRY_PORT`.
pub const DEFAULT_REGISTRY_PORT: u16 = 8787;

/// Service registry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Whether to use a shared registry at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Refuse to start if the registry cannot be reached. Otherwise the
    /// service runs without one and only finds interfaces it hosts or routes.
    #[serde(default)]
    pub required: bool,

    /// Registry address (host:port).
    #[serde(default = "default_registry_addr")]
    pub addr: String,

    /// How long to keep retrying the first contact, in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// First retry delay in milliseconds; doubles up to `retry_max_ms`.
    #[serde(default = "default_retry_initial")]
    pub retry_initial_ms: u64,

    /// Largest retry delay in milliseconds.
    #[serde(default = "default_retry_max")]
    pub retry_max_ms: u64,

    /// Timeout of each registry RPC in milliseconds.
    #[serde(default = "default_registry_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: false,
            addr: default_registry_addr(),
            connect_timeout_ms: default_connect_timeout(),
            retry_initial_ms: default_retry_initial(),
            retry_max_ms: default_retry_max(),
            request_timeout_ms: default_registry_request_timeout(),
        }
    }
}

impl RegistryConfig {
    /// Replaces the port of `addr`, keeping the host.
    pub fn set_port(&mut self, port: u16) {
        let host = self
            .addr
            .rsplit_once(':')
            .map_or(self.addr.as_str(), |(host, _)| host);
        self.addr = format!("{host}:{port}");
    }
}

fn default_registry_addr() -> String {
    format!("127.0.0.1:{DEFAULT_REGISTRY_PORT}")
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_retry_initial() -> u64 {
    50
}

fn default_retry_max() -> u64 {
    1000
}

fn default_registry_request_timeout() -> u64 {
    2000
}

/// Session handling configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Whether requests must present an `X-Session-ID`.
    ///
    /// When false, requests without one run under the permissive test
    /// session.
    #[serde(default)]
    pub require_session: bool,

    /// Location of the session store, when one is reachable.
    #[serde(default)]
    pub store_uri: Option<String>,

    /// Lifetime of sessions created by the store, in seconds.
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            require_session: false,
            store_uri: None,
            ttl_secs: default_session_ttl(),
        }
    }
}

fn default_session_ttl() -> u64 {
    3600
}

/// One static queue route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct QueueRouteConfig {
    /// Resource name.
    pub resource: String,
    /// Interface version.
    pub version: u32,
    /// Queue the resource's service consumes.
    pub queue_name: String,
    /// Path the request would have on HTTP, used for routing and logging.
    pub equivalent_path: String,
}

/// Queue transport configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Queue endpoint. The queue transport is active when this is set.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Static routing table.
    #[serde(default)]
    pub routes: Vec<QueueRouteConfig>,
}

impl QueueConfig {
    /// Returns `true` if the queue transport is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.endpoint.as_deref().is_some_and(|e| !e.is_empty())
    }
}

/// Inter-resource call configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InterResourceConfig {
    /// Locale assumed when none is given; `Content-Language` is only sent
    /// for other locales.
    #[serde(default = "default_locale")]
    pub default_locale: String,

    /// Timeout of remote HTTP calls in milliseconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_ms: u64,

    /// Timeout of queue calls in milliseconds.
    #[serde(default = "default_queue_timeout")]
    pub queue_timeout_ms: u64,

    /// Connection permits shared by concurrent call chains.
    #[serde(default = "default_max_local_connections")]
    pub max_local_connections: usize,
}

impl Default for InterResourceConfig {
    fn default() -> Self {
        Self {
            default_locale: default_locale(),
            http_timeout_ms: default_http_timeout(),
            queue_timeout_ms: default_queue_timeout(),
            max_local_connections: default_max_local_connections(),
        }
    }
}

fn default_locale() -> String {
    "en-nz".to_string()
}

fn default_http_timeout() -> u64 {
    30000
}

fn default_queue_timeout() -> u64 {
    30000
}

fn default_max_local_connections() -> usize {
    16
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Enable metrics collection and export.
    #[serde(default)]
    pub enabled: bool,

    /// Prometheus metrics endpoint address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include ANSI color codes in output.
    #[serde(default)]
    pub ansi_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfigSection {
    /// Service name for log and metric labels.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TelemetryConfigSection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "iris-service".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_set_port_keeps_host() {
        let mut registry = RegistryConfig::default();
        registry.set_port(9999);
        assert_eq!(registry.addr, "127.0.0.1:9999");

        let mut registry = RegistryConfig {
            addr: "registry.internal:1".into(),
            ..RegistryConfig::default()
        };
        registry.set_port(2);
        assert_eq!(registry.addr, "registry.internal:2");
    }

    #[test]
    fn test_queue_active_only_with_endpoint() {
        let mut queue = QueueConfig::default();
        assert!(!queue.is_active());
        queue.endpoint = Some(String::new());
        assert!(!queue.is_active());
        queue.endpoint = Some("amqp://localhost".into());
        assert!(queue.is_active());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: Result<ServerConfig, _> = toml::from_str("bogus = 1");
        assert!(result.is_err());
    }

    #[test]
    fn test_queue_routes_from_toml() {
        let queue: QueueConfig = toml::from_str(
            r#"
            endpoint = "amqp://localhost"

            [[routes]]
            resource = "Widget"
            version = 2
            queue_name = "service.widgets"
            equivalent_path = "/v2/widgets"
            "#,
        )
        .unwrap();
        assert_eq!(queue.routes.len(), 1);
        assert_eq!(queue.routes[0].version, 2);
    }
}
