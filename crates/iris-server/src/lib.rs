//! # Iris Server
//!
//! HTTP server for Iris services.
//!
//! This crate puts a [`ServiceRuntime`](iris_middleware::ServiceRuntime) on
//! the network:
//!
//! - HTTP/1.1 via Hyper
//! - Interface announcement to the service registry on start
//! - Request timeouts answered with `platform.timeout`
//! - Health, readiness and metrics endpoints
//! - Graceful shutdown with connection draining
//!
//! ## Example
//!
//! ```rust,no_run
//! use iris_config::ServerConfig;
//! use iris_core::ShutdownSignal;
//! use iris_middleware::ServiceRuntime;
//! use iris_server::Server;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = ServiceRuntime::builder().build()?;
//! let server = Server::bind(&ServerConfig::default(), runtime).await?;
//!
//! let shutdown = ShutdownSignal::new();
//! server.run_with_shutdown(shutdown).await?;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/iris-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod health;
pub mod server;
pub mod shutdown;

pub use error::{ServerError, ServerResult};
pub use health::{HealthCheck, HealthStatus, ReadinessCheck};
pub use server::{HttpResponse, Server};
pub use shutdown::{ConnectionToken, ConnectionTracker};
