//! # Iris Registry
//!
//! Service discovery for Iris deployments.
//!
//! Every process hosting resource interfaces announces them to a shared
//! registry as `(resource, version) → base URI`. Processes making
//! inter-resource calls resolve targets through an [`EndpointLocator`],
//! which prefers in-process interfaces, then static queue routes, then the
//! registry.
//!
//! - [`ServiceRegistry`] - the registry seam
//! - [`InMemoryRegistry`] - concurrent in-process registry
//! - [`RegistryServer`] - JSON-over-HTTP RPC server (also the `iris-registry` binary)
//! - [`RemoteRegistry`] - RPC client with startup backoff
//! - [`EndpointLocator`] / [`EndpointLocation`] - target resolution
//!
//! # Example
//!
//! ```bash
//! # Run a standalone registry on the default port
//! $ iris-registry
//!
//! # Run on another port, for test isolation
//! $ IRIS_REGISTRY_PORT=9787 iris-registry
//! ```

#![doc(html_root_url = "https://docs.rs/iris-registry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod client;
pub mod error;
pub mod locator;
pub mod registry;
pub mod server;

pub use client::{RemoteRegistry, RetryPolicy};
pub use error::{RegistryError, RegistryResult};
pub use locator::{EndpointLocation, EndpointLocator, QueueRoute, QueueRoutes};
pub use registry::{BoxFuture, InMemoryRegistry, RegistryKey, ServiceRegistry};
pub use server::RegistryServer;

/// Registry version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
