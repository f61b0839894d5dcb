//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::env;
use std::fs;
use std::path::Path;

use crate::{ConfigError, IrisConfig, LogFormat};

/// Port of the shared service registry.
pub const REGISTRY_PORT_VAR: &str = "IRIS_REGISTRY_PORT";

/// Set when an on-queue transport is active; holds the queue endpoint.
pub const QUEUE_ENDPOINT_VAR: &str = "IRIS_QUEUE_ENDPOINT";

/// Set when a session store is reachable; holds its location.
pub const SESSION_STORE_URI_VAR: &str = "IRIS_SESSION_STORE_URI";

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables (`PREFIX__SECTION__KEY`)
/// 4. Deployment boundary variables ([`REGISTRY_PORT_VAR`],
///    [`QUEUE_ENDPOINT_VAR`], [`SESSION_STORE_URI_VAR`]), if enabled
///
/// # Example
///
/// ```no_run
/// use iris_config::ConfigLoader;
///
/// # fn main() -> Result<(), iris_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("iris.toml")?
///     .with_env_prefix("IRIS")
///     .with_boundary_env()
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: IrisConfig,
    env_prefix: Option<String>,
    boundary_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: IrisConfig::default(),
            env_prefix: None,
            boundary_env: false,
        }
    }

    /// Start with default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = IrisConfig::default();
        self
    }

    /// Start with development preset configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use iris_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_development()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = IrisConfig::development();
        self
    }

    /// Start with production preset configuration.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = IrisConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML (.toml) and JSON (.json) formats, chosen by extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed,
    /// or contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `"toml"` or `"json"` format.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use iris_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [registry]
    ///     addr = "10.0.0.5:8787"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.registry.addr, "10.0.0.5:8787");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`, e.g.
    /// `IRIS__SERVER__HTTP_ADDR=0.0.0.0:9000`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Honour the deployment boundary variables.
    #[must_use]
    pub fn with_boundary_env(mut self) -> Self {
        self.boundary_env = true;
        self
    }

    /// Load a `.env` file for environment variables, if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a `.env` file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::validation_error(format!(
                "failed to load .env file: {e}"
            ))),
        }
    }

    /// Finalize using the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an environment variable cannot be parsed or
    /// the final configuration is invalid.
    pub fn load(self) -> Result<IrisConfig, ConfigError> {
        self.load_from_vars(env::vars())
    }

    /// Finalize using the given environment variables instead of the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable cannot be parsed or the final
    /// configuration is invalid.
    ///
    /// # Example
    ///
    /// ```
    /// use iris_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_boundary_env()
    ///     .load_from_vars([("IRIS_REGISTRY_PORT".to_string(), "9100".to_string())])
    ///     .unwrap();
    ///
    /// assert_eq!(config.registry.addr, "127.0.0.1:9100");
    /// ```
    pub fn load_from_vars<I>(mut self, vars: I) -> Result<IrisConfig, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();

        if let Some(prefix) = self.env_prefix.take() {
            let section_prefix = format!("{prefix}__");
            for (key, value) in vars.iter().filter(|(k, _)| k.starts_with(&section_prefix)) {
                self.apply_env_var(key, value, &prefix)?;
            }
        }

        if self.boundary_env {
            for (key, value) in &vars {
                self.apply_boundary_var(key, value)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Finalize without validation or environment overrides.
    #[must_use]
    pub fn load_unvalidated(self) -> IrisConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<IrisConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    fn apply_boundary_var(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            REGISTRY_PORT_VAR => {
                let port = value
                    .parse::<u16>()
                    .ok()
                    .filter(|port| *port != 0)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected port number"))?;
                self.config.registry.set_port(port);
            }
            QUEUE_ENDPOINT_VAR => {
                self.config.queue.endpoint = non_empty(value);
            }
            SESSION_STORE_URI_VAR => {
                self.config.session.store_uri = non_empty(value);
            }
            _ => {}
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let integer = || ConfigError::env_parse_error(key, "expected integer");
        let boolean = || ConfigError::env_parse_error(key, "expected boolean");

        match parts.as_slice() {
            ["SERVER", "HTTP_ADDR"] => self.config.server.http_addr = value.to_string(),
            ["SERVER", "PUBLIC_BASE_URL"] => self.config.server.public_base_url = non_empty(value),
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                self.config.server.shutdown_timeout_secs = value.parse().map_err(|_| integer())?;
            }
            ["SERVER", "REQUEST_TIMEOUT_MS"] => {
                self.config.server.request_timeout_ms = value.parse().map_err(|_| integer())?;
            }

            ["REGISTRY", "ENABLED"] => {
                self.config.registry.enabled = parse_bool(value).ok_or_else(boolean)?;
            }
            ["REGISTRY", "REQUIRED"] => {
                self.config.registry.required = parse_bool(value).ok_or_else(boolean)?;
            }
            ["REGISTRY", "ADDR"] => self.config.registry.addr = value.to_string(),
            ["REGISTRY", "CONNECT_TIMEOUT_MS"] => {
                self.config.registry.connect_timeout_ms = value.parse().map_err(|_| integer())?;
            }
            ["REGISTRY", "RETRY_INITIAL_MS"] => {
                self.config.registry.retry_initial_ms = value.parse().map_err(|_| integer())?;
            }
            ["REGISTRY", "RETRY_MAX_MS"] => {
                self.config.registry.retry_max_ms = value.parse().map_err(|_| integer())?;
            }
            ["REGISTRY", "REQUEST_TIMEOUT_MS"] => {
                self.config.registry.request_timeout_ms = value.parse().map_err(|_| integer())?;
            }

            ["SESSION", "REQUIRE_SESSION"] => {
                self.config.session.require_session = parse_bool(value).ok_or_else(boolean)?;
            }
            ["SESSION", "STORE_URI"] => self.config.session.store_uri = non_empty(value),
            ["SESSION", "TTL_SECS"] => {
                self.config.session.ttl_secs = value.parse().map_err(|_| integer())?;
            }

            ["QUEUE", "ENDPOINT"] => self.config.queue.endpoint = non_empty(value),

            ["INTER_RESOURCE", "DEFAULT_LOCALE"] => {
                self.config.inter_resource.default_locale = value.to_string();
            }
            ["INTER_RESOURCE", "HTTP_TIMEOUT_MS"] => {
                self.config.inter_resource.http_timeout_ms = value.parse().map_err(|_| integer())?;
            }
            ["INTER_RESOURCE", "QUEUE_TIMEOUT_MS"] => {
                self.config.inter_resource.queue_timeout_ms =
                    value.parse().map_err(|_| integer())?;
            }
            ["INTER_RESOURCE", "MAX_LOCAL_CONNECTIONS"] => {
                self.config.inter_resource.max_local_connections =
                    value.parse().map_err(|_| integer())?;
            }

            ["TELEMETRY", "SERVICE_NAME"] => {
                self.config.telemetry.service_name = value.to_string();
            }
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                self.config.telemetry.metrics.enabled = parse_bool(value).ok_or_else(boolean)?;
            }
            ["TELEMETRY", "METRICS", "ADDR"] => {
                self.config.telemetry.metrics.addr = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                self.config.telemetry.logging.enabled = parse_bool(value).ok_or_else(boolean)?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                self.config.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                self.config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["TELEMETRY", "LOGGING", "ANSI_ENABLED"] => {
                self.config.telemetry.logging.ansi_enabled =
                    parse_bool(value).ok_or_else(boolean)?;
            }

            // Unknown keys are ignored.
            _ => {}
        }

        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load_from_vars(Vec::new()).unwrap();
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_loader_with_development() {
        let config = ConfigLoader::new()
            .with_development()
            .load_from_vars(Vec::new())
            .unwrap();
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"inter_resource": {"default_locale": "en-gb"}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load_from_vars(Vec::new())
            .unwrap();
        assert_eq!(config.inter_resource.default_locale, "en-gb");
    }

    #[test]
    fn test_loader_with_string_unknown_format() {
        assert!(ConfigLoader::new().with_string("", "yaml").is_err());
    }

    #[test]
    fn test_loader_with_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [server]
            http_addr = "127.0.0.1:7000"

            [queue]
            endpoint = "amqp://localhost"

            [[queue.routes]]
            resource = "Widget"
            version = 1
            queue_name = "service.widgets"
            equivalent_path = "/v1/widgets"
            "#
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_file(file.path())
            .unwrap()
            .load_from_vars(Vec::new())
            .unwrap();
        assert_eq!(config.server.http_addr, "127.0.0.1:7000");
        assert!(config.queue.is_active());
        assert_eq!(config.queue.routes[0].queue_name, "service.widgets");
    }

    #[test]
    fn test_loader_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(ConfigLoader::new().with_file(file.path()).is_err());
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/iris.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/iris.toml")
            .unwrap()
            .load_unvalidated();
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_prefixed_env_overrides() {
        let config = ConfigLoader::new()
            .with_env_prefix("iris")
            .load_from_vars(vars(&[
                ("IRIS__SERVER__HTTP_ADDR", "127.0.0.1:9000"),
                ("IRIS__REGISTRY__ENABLED", "off"),
                ("IRIS__REGISTRY__REQUIRED", "true"),
                ("IRIS__SESSION__REQUIRE_SESSION", "yes"),
                ("IRIS__TELEMETRY__LOGGING__FORMAT", "pretty"),
                ("IRIS__UNKNOWN__KEY", "ignored"),
                ("OTHER__SERVER__HTTP_ADDR", "bogus"),
            ]))
            .unwrap();
        assert_eq!(config.server.http_addr, "127.0.0.1:9000");
        assert!(!config.registry.enabled);
        assert!(config.registry.required);
        assert!(config.session.require_session);
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_prefixed_env_invalid_integer() {
        let result = ConfigLoader::new()
            .with_env_prefix("IRIS")
            .load_from_vars(vars(&[("IRIS__SERVER__REQUEST_TIMEOUT_MS", "soon")]));
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));
    }

    #[test]
    fn test_boundary_vars() {
        let config = ConfigLoader::new()
            .with_boundary_env()
            .load_from_vars(vars(&[
                (REGISTRY_PORT_VAR, "9100"),
                (QUEUE_ENDPOINT_VAR, "amqp://queue"),
                (SESSION_STORE_URI_VAR, "memory://sessions"),
            ]))
            .unwrap();
        assert_eq!(config.registry.addr, "127.0.0.1:9100");
        assert!(config.queue.is_active());
        assert!(config.sessions_required());
    }

    #[test]
    fn test_boundary_vars_ignored_unless_enabled() {
        let config = ConfigLoader::new()
            .load_from_vars(vars(&[(QUEUE_ENDPOINT_VAR, "amqp://queue")]))
            .unwrap();
        assert!(!config.queue.is_active());
    }

    #[test]
    fn test_boundary_registry_port_invalid() {
        let result = ConfigLoader::new()
            .with_boundary_env()
            .load_from_vars(vars(&[(REGISTRY_PORT_VAR, "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
