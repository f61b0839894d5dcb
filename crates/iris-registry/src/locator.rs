//! Endpoint location.
//!
//! An [`EndpointLocator`] decides how a resource interface is reached from
//! this process: in-process, over a queue route, or over HTTP at a base URI
//! found in the shared registry. The order is fixed:
//!
//! 1. interfaces hosted here are [`EndpointLocation::Local`];
//! 2. with an active queue transport, statically routed interfaces are
//!    [`EndpointLocation::Queue`];
//! 3. otherwise the registry is asked.
//!
//! Registry failures never escape: they are logged and reported as "not
//! found".

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use iris_config::{QueueConfig, QueueRouteConfig};

use crate::registry::{RegistryKey, ServiceRegistry};

/// Where an interface is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointLocation {
    /// Hosted by this process.
    Local,
    /// Served over HTTP; `base_uri` already includes `/v{n}/{endpoint}`.
    Http {
        /// Base URI of the collection.
        base_uri: String,
    },
    /// Served over a queue.
    Queue {
        /// Queue consumed by the serving process.
        queue_name: String,
        /// Path the request would have over HTTP.
        equivalent_path: String,
    },
}

impl EndpointLocation {
    /// Short transport name used in logs and metric labels.
    #[must_use]
    pub fn transport(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Http { .. } => "http",
            Self::Queue { .. } => "queue",
        }
    }
}

impl fmt::Display for EndpointLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Http { base_uri } => write!(f, "http {base_uri}"),
            Self::Queue {
                queue_name,
                equivalent_path,
            } => write!(f, "queue {queue_name} {equivalent_path}"),
        }
    }
}

/// A static queue route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRoute {
    /// Queue consumed by the serving process.
    pub queue_name: String,
    /// Path the request would have over HTTP.
    pub equivalent_path: String,
}

/// Static routing table for the queue transport.
#[derive(Debug, Clone, Default)]
pub struct QueueRoutes {
    routes: HashMap<RegistryKey, QueueRoute>,
}

impl QueueRoutes {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route, replacing any previous route for the same interface.
    #[must_use]
    pub fn with_route(
        mut self,
        resource: impl Into<String>,
        version: u32,
        queue_name: impl Into<String>,
        equivalent_path: impl Into<String>,
    ) -> Self {
        self.routes.insert(
            RegistryKey::new(resource, version),
            QueueRoute {
                queue_name: queue_name.into(),
                equivalent_path: equivalent_path.into(),
            },
        );
        self
    }

    /// Route for an interface, if any.
    #[must_use]
    pub fn get(&self, key: &RegistryKey) -> Option<&QueueRoute> {
        self.routes.get(key)
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if there are no routes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl From<&[QueueRouteConfig]> for QueueRoutes {
    fn from(routes: &[QueueRouteConfig]) -> Self {
        routes.iter().fold(Self::new(), |table, route| {
            table.with_route(
                route.resource.clone(),
                route.version,
                route.queue_name.clone(),
                route.equivalent_path.clone(),
            )
        })
    }
}

/// Resolves interfaces to [`EndpointLocation`]s.
#[derive(Debug, Clone, Default)]
pub struct EndpointLocator {
    hosted: HashSet<RegistryKey>,
    queue_active: bool,
    queue_routes: QueueRoutes,
    registry: Option<Arc<dyn ServiceRegistry>>,
}

impl EndpointLocator {
    /// Creates a locator that knows nothing: every lookup is `None`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an interface as hosted by this process.
    #[must_use]
    pub fn with_hosted(mut self, resource: impl Into<String>, version: u32) -> Self {
        self.hosted.insert(RegistryKey::new(resource, version));
        self
    }

    /// Sets the queue routing table and whether the queue transport is
    /// active.
    #[must_use]
    pub fn with_queue(mut self, active: bool, routes: QueueRoutes) -> Self {
        self.queue_active = active;
        self.queue_routes = routes;
        self
    }

    /// Reads queue settings from configuration.
    #[must_use]
    pub fn with_queue_config(self, config: &QueueConfig) -> Self {
        self.with_queue(config.is_active(), QueueRoutes::from(config.routes.as_slice()))
    }

    /// Sets the shared registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn ServiceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Returns `true` if the interface is hosted by this process.
    #[must_use]
    pub fn is_hosted(&self, resource: &str, version: u32) -> bool {
        self.hosted.contains(&RegistryKey::new(resource, version))
    }

    /// Returns `true` if a registry is configured.
    #[must_use]
    pub fn has_registry(&self) -> bool {
        self.registry.is_some()
    }

    /// Locates an interface; `None` means not found.
    pub async fn locate(&self, resource: &str, version: u32) -> Option<EndpointLocation> {
        let key = RegistryKey::new(resource, version);

        if self.hosted.contains(&key) {
            return Some(EndpointLocation::Local);
        }

        if self.queue_active {
            if let Some(route) = self.queue_routes.get(&key) {
                return Some(EndpointLocation::Queue {
                    queue_name: route.queue_name.clone(),
                    equivalent_path: route.equivalent_path.clone(),
                });
            }
        }

        let registry = self.registry.as_ref()?;
        match registry.find(&key).await {
            Ok(Some(base_uri)) => {
                iris_telemetry::record_registry_lookup("hit");
                Some(EndpointLocation::Http { base_uri })
            }
            Ok(None) => {
                iris_telemetry::record_registry_lookup("miss");
                tracing::debug!(key = %key, "Interface not registered");
                None
            }
            Err(e) => {
                iris_telemetry::record_registry_lookup("error");
                tracing::warn!(key = %key, error = %e, "Registry lookup failed, treating as not found");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RemoteRegistry;
    use crate::registry::InMemoryRegistry;
    use std::time::Duration;

    fn routes() -> QueueRoutes {
        QueueRoutes::new().with_route("Widget", 1, "service.widgets", "/v1/widgets")
    }

    #[tokio::test]
    async fn test_hosted_is_local() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry
            .add(&RegistryKey::new("Widget", 1), "http://elsewhere/v1/widgets")
            .await
            .unwrap();

        let locator = EndpointLocator::new()
            .with_hosted("Widget", 1)
            .with_queue(true, routes())
            .with_registry(registry);

        assert_eq!(locator.locate("Widget", 1).await, Some(EndpointLocation::Local));
    }

    #[tokio::test]
    async fn test_queue_route_when_active() {
        let locator = EndpointLocator::new().with_queue(true, routes());
        assert_eq!(
            locator.locate("Widget", 1).await,
            Some(EndpointLocation::Queue {
                queue_name: "service.widgets".into(),
                equivalent_path: "/v1/widgets".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_queue_route_ignored_when_inactive() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry
            .add(&RegistryKey::new("Widget", 1), "http://b/v1/widgets")
            .await
            .unwrap();

        let locator = EndpointLocator::new()
            .with_queue(false, routes())
            .with_registry(registry);

        assert_eq!(
            locator.locate("Widget", 1).await,
            Some(EndpointLocation::Http {
                base_uri: "http://b/v1/widgets".into()
            })
        );
    }

    #[tokio::test]
    async fn test_unregistered_is_none() {
        let locator = EndpointLocator::new().with_registry(Arc::new(InMemoryRegistry::new()));
        assert_eq!(locator.locate("Widget", 1).await, None);
    }

    #[tokio::test]
    async fn test_no_registry_is_none() {
        let locator = EndpointLocator::new();
        assert!(!locator.has_registry());
        assert_eq!(locator.locate("Widget", 1).await, None);
    }

    #[tokio::test]
    async fn test_refused_registry_is_none() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let remote = RemoteRegistry::new(addr.to_string(), Duration::from_millis(200)).unwrap();
        let locator = EndpointLocator::new().with_registry(Arc::new(remote));

        assert_eq!(locator.locate("Widget", 1).await, None);
    }

    #[test]
    fn test_routes_from_config() {
        let config = [QueueRouteConfig {
            resource: "Widget".into(),
            version: 2,
            queue_name: "service.widgets".into(),
            equivalent_path: "/v2/widgets".into(),
        }];
        let table = QueueRoutes::from(&config[..]);
        assert_eq!(table.len(), 1);
        assert!(table.get(&RegistryKey::new("Widget", 2)).is_some());
    }

    #[test]
    fn test_transport_names() {
        assert_eq!(EndpointLocation::Local.transport(), "local");
        assert_eq!(
            EndpointLocation::Http {
                base_uri: String::new()
            }
            .transport(),
            "http"
        );
    }
}
