//! # Iris
//!
//! **Inter-resource calls for Themis Platform services**
//!
//! Iris lets a resource implementation call another resource's interface as
//! if it were local, whether that interface is hosted in the same service,
//! in another service reachable over HTTP, or behind a message queue:
//!
//! - **Service discovery** through a shared registry of interface endpoints
//! - **Context propagation** of locale, dating and interaction ids to the
//!   downstream call
//! - **Session augmentation** so the callee sees the caller's permissions
//!   plus whatever the calling interface was granted
//! - **Uniform results** regardless of the transport used
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use iris::prelude::*;
//! use serde_json::json;
//!
//! struct Greeter;
//!
//! impl Resource for Greeter {
//!     fn show<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
//!         Box::pin(async move {
//!             let result = ctx.resource("Clock", 1).show("now").await?;
//!             ctx.response_mut().set_resource(json!({"time": result.to_json()}));
//!             Ok(())
//!         })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_defaults().with_boundary_env().load()?;
//!
//!     Service::new(config)
//!         .interface(Interface::new("Greeter", 1, "greeters", Greeter))
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ctx.resource(R, v) → EndpointLocator → CallContextDeriver → SessionPermissionAugmenter
//!                                                                     ↓
//!   CallResult ← ResultNormalizer ← TransportInvoker {Local, RemoteHTTP, RemoteQueue}
//! ```

#![doc(html_root_url = "https://docs.rs/iris/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod service;

// Re-export core types
pub use iris_core as core;

// Re-export configuration
pub use iris_config as config;

// Re-export logging and metrics
pub use iris_telemetry as telemetry;

// Re-export service discovery
pub use iris_registry as registry;

// Re-export session stores
pub use iris_session as session;

// Re-export the call runtime
pub use iris_middleware as middleware;

// Re-export the HTTP server
pub use iris_server as server;

pub use service::{Service, ServiceError};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use iris::prelude::*;
///
/// let errors = ErrorCollection::new();
/// assert!(!errors.has_errors());
/// ```
pub mod prelude {
    pub use iris_core::{
        codes, Action, CallResult, CollectionResult, ErrorCollection, InteractionId, IrisError,
        IrisResult, ListParameters, Permissions, Policy, Reference, ResourceResult, Session,
        ShutdownSignal,
    };

    pub use iris_config::{ConfigLoader, IrisConfig};

    pub use iris_middleware::{
        BoxFuture, Context, InProcessQueue, InterResourceEndpoint, Interface, QueueBinding,
        Resource, ServiceRuntime,
    };

    pub use iris_registry::{InMemoryRegistry, RemoteRegistry, ServiceRegistry};

    pub use iris_session::{InMemorySessionStore, SessionStore};

    pub use iris_server::Server;

    pub use crate::{Service, ServiceError};
}
