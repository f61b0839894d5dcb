//! The registry abstraction and its in-memory implementation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use dashmap::DashMap;
use iris_core::ShutdownSignal;
use serde::{Deserialize, Serialize};

use crate::error::RegistryResult;

/// A boxed future, used at the object-safe registry seam.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Identifies one interface: a resource name at one version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistryKey {
    /// Resource name, e.g. `"Widget"`.
    pub resource: String,
    /// Interface version.
    pub version: u32,
}

impl RegistryKey {
    /// Creates a key.
    pub fn new(resource: impl Into<String>, version: u32) -> Self {
        Self {
            resource: resource.into(),
            version,
        }
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/v{}", self.resource, self.version)
    }
}

/// A store mapping `(resource, version)` to the base URI serving it.
///
/// Shared by every process of a deployment. Implementations must be safe to
/// use concurrently; the last `add` for a key wins.
pub trait ServiceRegistry: Send + Sync + fmt::Debug {
    /// Records where an interface is served.
    fn add<'a>(&'a self, key: &'a RegistryKey, uri: &'a str) -> BoxFuture<'a, RegistryResult<()>>;

    /// Looks up where an interface is served.
    fn find<'a>(&'a self, key: &'a RegistryKey) -> BoxFuture<'a, RegistryResult<Option<String>>>;

    /// Liveness probe.
    fn ping(&self) -> BoxFuture<'_, RegistryResult<bool>>;

    /// Asks the registry to shut down.
    fn stop(&self) -> BoxFuture<'_, RegistryResult<()>>;
}

/// Concurrent in-process registry.
///
/// # Example
///
/// ```
/// use iris_registry::{InMemoryRegistry, RegistryKey, ServiceRegistry};
///
/// # tokio_test::block_on(async {
/// let registry = InMemoryRegistry::new();
/// let key = RegistryKey::new("Widget", 1);
/// registry.add(&key, "http://127.0.0.1:9000/v1/widgets").await.unwrap();
///
/// let uri = registry.find(&key).await.unwrap();
/// assert_eq!(uri.as_deref(), Some("http://127.0.0.1:9000/v1/widgets"));
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entries: DashMap<RegistryKey, String>,
    shutdown: Option<ShutdownSignal>,
}

impl InMemoryRegistry {
    /// Creates an empty registry whose `stop` does nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry whose `stop` triggers `shutdown`.
    #[must_use]
    pub fn with_shutdown(shutdown: ShutdownSignal) -> Self {
        Self {
            entries: DashMap::new(),
            shutdown: Some(shutdown),
        }
    }

    /// Number of registered interfaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ServiceRegistry for InMemoryRegistry {
    fn add<'a>(&'a self, key: &'a RegistryKey, uri: &'a str) -> BoxFuture<'a, RegistryResult<()>> {
        Box::pin(async move {
            if let Some(previous) = self.entries.insert(key.clone(), uri.to_string()) {
                if previous != uri {
                    tracing::debug!(key = %key, previous = %previous, uri = %uri, "Registry entry replaced");
                }
            }
            Ok(())
        })
    }

    fn find<'a>(&'a self, key: &'a RegistryKey) -> BoxFuture<'a, RegistryResult<Option<String>>> {
        Box::pin(async move { Ok(self.entries.get(key).map(|entry| entry.value().clone())) })
    }

    fn ping(&self) -> BoxFuture<'_, RegistryResult<bool>> {
        Box::pin(async { Ok(true) })
    }

    fn stop(&self) -> BoxFuture<'_, RegistryResult<()>> {
        Box::pin(async move {
            if let Some(shutdown) = &self.shutdown {
                shutdown.trigger();
            }
            Ok(())
        })
    }
}
