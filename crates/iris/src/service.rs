//! Service bootstrap.
//!
//! Wires a service together from an [`IrisConfig`]: telemetry, the shared
//! registry, the session store, the runtime and the HTTP server.

use std::sync::Arc;

use iris_config::{ConfigError, IrisConfig};
use iris_core::IrisError;
use iris_middleware::{Interface, QueueBinding, ServiceRuntime};
use iris_registry::{RegistryError, RemoteRegistry};
use iris_server::{Server, ServerError};
use iris_session::StoreError;
use iris_telemetry::TelemetryError;
use thiserror::Error;

/// Errors raised while starting a service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Telemetry could not be initialized.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The registry could not be reached and `registry.required` is set.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The session store could not be opened.
    #[error(transparent)]
    SessionStore(#[from] StoreError),

    /// The runtime could not be built.
    #[error(transparent)]
    Runtime(#[from] IrisError),

    /// The server failed.
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// A service being assembled.
///
/// # Example
///
/// ```rust,no_run
/// use iris::prelude::*;
/// use iris::Service;
///
/// struct Health;
///
/// impl Resource for Health {}
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = iris::config::ConfigLoader::new()
///         .with_defaults()
///         .with_boundary_env()
///         .load()?;
///
///     Service::new(config)
///         .interface(Interface::new("Health", 1, "health_checks", Health))
///         .run()
///         .await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Service {
    config: IrisConfig,
    interfaces: Vec<Interface>,
    queue_binding: Option<Arc<dyn QueueBinding>>,
}

impl Service {
    /// Starts a service from configuration.
    #[must_use]
    pub fn new(config: IrisConfig) -> Self {
        Self {
            config,
            interfaces: Vec::new(),
            queue_binding: None,
        }
    }

    /// Hosts an interface.
    #[must_use]
    pub fn interface(mut self, interface: Interface) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Uses a queue binding for queue-routed calls.
    #[must_use]
    pub fn queue_binding(mut self, binding: Arc<dyn QueueBinding>) -> Self {
        self.queue_binding = Some(binding);
        self
    }

    /// Connects to the registry and session store, builds the runtime and
    /// binds the server.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the configuration is invalid, the session
    /// store cannot be opened or the server cannot bind. An unreachable
    /// registry is only an error when `registry.required` is set.
    pub async fn build(self) -> Result<Server, ServiceError> {
        self.config.validate()?;

        let mut builder = ServiceRuntime::builder().config(&self.config);
        for interface in self.interfaces {
            builder = builder.interface(interface);
        }

        if self.config.registry.enabled {
            match RemoteRegistry::connect(&self.config.registry).await {
                Ok(registry) => {
                    tracing::info!(addr = %registry.addr(), "Connected to service registry");
                    builder = builder.registry(Arc::new(registry));
                }
                Err(error @ RegistryError::Unavailable { .. })
                    if !self.config.registry.required =>
                {
                    tracing::warn!(
                        error = %error,
                        "Service registry unavailable; running without one"
                    );
                }
                Err(error) => return Err(error.into()),
            }
        }

        if let Some(uri) = &self.config.session.store_uri {
            builder = builder.session_store(iris_session::open_store(uri)?);
        }

        if let Some(binding) = self.queue_binding {
            builder = builder.queue_binding(binding);
        } else if self.config.queue.is_active() {
            tracing::warn!("Queue routes configured without a queue binding; routed calls will fail");
        }

        let runtime = builder.build()?;
        Ok(Server::bind(&self.config.server, runtime).await?)
    }

    /// Initializes telemetry, builds the service and serves until SIGTERM
    /// or SIGINT.
    ///
    /// # Errors
    ///
    /// See [`Service::build`].
    pub async fn run(self) -> Result<(), ServiceError> {
        iris_telemetry::init_telemetry(&self.config.telemetry)?;
        let server = self.build().await?;
        server.run().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iris_middleware::{BoxFuture, Context, Resource};

    struct Nothing;

    impl Resource for Nothing {
        fn show<'a>(&'a self, _ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn config() -> IrisConfig {
        let mut config = IrisConfig::default();
        config.server.http_addr = "127.0.0.1:0".into();
        config.registry.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_build_without_registry() {
        let server = Service::new(config())
            .interface(Interface::new("Nothing", 1, "nothings", Nothing))
            .build()
            .await
            .unwrap();

        assert_ne!(server.local_addr().port(), 0);
        assert!(server.runtime().interface("Nothing", 1).is_some());
    }

    async fn unreachable_registry() -> IrisConfig {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = listener.local_addr().unwrap();
        drop(listener);

        let mut config = config();
        config.registry.enabled = true;
        config.registry.addr = dead.to_string();
        config.registry.connect_timeout_ms = 100;
        config.registry.retry_initial_ms = 10;
        config.registry.retry_max_ms = 20;
        config
    }

    #[tokio::test]
    async fn test_unreachable_registry_degrades() {
        let server = Service::new(unreachable_registry().await)
            .interface(Interface::new("Nothing", 1, "nothings", Nothing))
            .build()
            .await
            .unwrap();

        let locator = server.runtime().locator();
        assert!(locator.locate("Nothing", 1).await.is_some());
        assert!(locator.locate("Elsewhere", 1).await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_required_registry_fails() {
        let mut config = unreachable_registry().await;
        config.registry.required = true;

        let error = Service::new(config).build().await.unwrap_err();
        assert!(matches!(
            error,
            ServiceError::Registry(RegistryError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_session_store_fails() {
        let mut config = config();
        config.session.store_uri = Some("carrier-pigeon://loft".into());

        let error = Service::new(config).build().await.unwrap_err();
        assert!(matches!(error, ServiceError::SessionStore(_)));
    }

    #[tokio::test]
    async fn test_duplicate_interfaces_fail() {
        let error = Service::new(config())
            .interface(Interface::new("Nothing", 1, "nothings", Nothing))
            .interface(Interface::new("Nothing", 1, "nothings", Nothing))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::Runtime(_)));
    }
}
