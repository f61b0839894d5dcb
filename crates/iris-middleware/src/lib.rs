//! # Iris Middleware
//!
//! Resource hosting and inter-resource calls for the Iris platform.
//!
//! A service builds a [`ServiceRuntime`] from the [`Interface`]s it hosts.
//! The runtime handles inbound requests (HTTP or queue) and gives every
//! action a [`Context`] from which other resources can be called through an
//! [`InterResourceEndpoint`], wherever they live:
//!
//! ```text
//! endpoint.show("x")
//!     │
//!     ├─ EndpointLocator      local? queue route? registry?
//!     ├─ derive               child context: fresh id, inherited locale/dates
//!     ├─ authorise            resource UUID, identity assumption
//!     ├─ augment              extra permissions → new persisted session
//!     ├─ transport            Local | RemoteHTTP | RemoteQueue
//!     └─ ResultNormalizer     raw reply → CallResult
//! ```
//!
//! Expected failures of the target (not found, validation errors, timeouts)
//! come back as errors embedded in the [`CallResult`](iris_core::CallResult);
//! only fatal problems are returned as `Err`.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use iris_core::Session;
//! use iris_middleware::{BoxFuture, Context, Interface, Resource, ServiceRuntime};
//! use serde_json::json;
//!
//! struct Clock;
//!
//! impl Resource for Clock {
//!     fn show<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
//!         Box::pin(async move {
//!             ctx.response_mut().set_resource(json!({"time": "now"}));
//!             Ok(())
//!         })
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let runtime = ServiceRuntime::builder()
//!     .interface(Interface::new("Clock", 1, "clocks", Clock))
//!     .build()
//!     .unwrap();
//!
//! let session = Arc::new(Session::test_session());
//! let mut clock = runtime.endpoint("Clock", 1, Some(session));
//! let result = clock.show("utc").await.unwrap();
//! assert!(!result.has_errors());
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/iris-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod connection;
pub mod context;
pub mod deriver;
pub mod endpoint;
pub mod headers;
pub mod inbound;
pub mod interface;
pub mod normalize;
pub mod render;
pub mod resource;
pub mod runtime;
pub mod transport;

// Re-export main types at crate root
pub use connection::ConnectionPool;
pub use context::Context;
pub use deriver::{
    authorise, check_secured_values, derive, CallOverrides, ChildRequestContext, ParentContext,
    Unauthorised,
};
pub use endpoint::InterResourceEndpoint;
pub use inbound::{InboundRejection, InboundRequest};
pub use interface::Interface;
pub use normalize::ResultNormalizer;
pub use render::{render, render_errors, render_fault};
pub use resource::{BoxFuture, Resource, Verification};
pub use runtime::{
    DispatchRequest, RuntimeSettings, ServiceRuntime, ServiceRuntimeBuilder, WeakRuntime,
};
pub use transport::queue::{
    InProcessQueue, QueueBinding, QueueError, QueueMessage, QueueReply, QueueResult,
};
pub use transport::{CallRequest, RawResponse, TransportFailure, TransportOutcome};
