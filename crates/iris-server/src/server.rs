//! HTTP server.
//!
//! Serves the interfaces of a [`ServiceRuntime`] over HTTP/1.1 with Hyper:
//!
//! - `GET /health`, `GET /ready` and `GET /metrics` are answered directly;
//! - everything else is handed to [`ServiceRuntime::handle_http`], bounded by
//!   the configured request timeout (`408 platform.timeout` when exceeded).
//!
//! On start the hosted interfaces are announced to the runtime's service
//! registry under the public base URL, so other services can locate them.
//!
//! # Example
//!
//! ```rust,no_run
//! use iris_config::ServerConfig;
//! use iris_middleware::ServiceRuntime;
//! use iris_server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = ServiceRuntime::builder().build()?;
//!     let server = Server::bind(&ServerConfig::default(), runtime).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use iris_config::ServerConfig;
use iris_core::{codes, ErrorCollection, InteractionId, ShutdownSignal};
use iris_middleware::headers::X_INTERACTION_ID;
use iris_middleware::{render_errors, RawResponse, ServiceRuntime};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::error::{ServerError, ServerResult};
use crate::health::{HealthCheck, ReadinessCheck};
use crate::shutdown::ConnectionTracker;

/// Type alias for the HTTP response.
pub type HttpResponse = Response<Full<Bytes>>;

struct ServerState {
    runtime: ServiceRuntime,
    health: HealthCheck,
    readiness: ReadinessCheck,
    request_timeout: Duration,
}

/// A bound Iris HTTP server.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    public_base_url: Option<String>,
    shutdown_timeout: Duration,
    state: Arc<ServerState>,
}

impl Server {
    /// Binds to `config.http_addr`; port 0 picks a free port.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidAddress`] or [`ServerError::Bind`].
    pub async fn bind(config: &ServerConfig, runtime: ServiceRuntime) -> ServerResult<Self> {
        let addr: SocketAddr = config
            .http_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| {
                ServerError::invalid_address(&config.http_addr, e.to_string())
            })?;

        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr()?;

        let health = HealthCheck::new("iris", env!("CARGO_PKG_VERSION")).with_interfaces(
            runtime
                .interfaces()
                .map(|interface| format!("{}/v{}", interface.resource(), interface.version())),
        );

        Ok(Self {
            listener,
            local_addr,
            public_base_url: config.public_base_url.clone(),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            state: Arc::new(ServerState {
                runtime,
                health,
                readiness: ReadinessCheck::new(),
                request_timeout: Duration::from_millis(config.request_timeout_ms),
            }),
        })
    }

    /// The address actually bound.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The base URL other services use to reach this server.
    ///
    /// The configured public base URL if set, else derived from the bound
    /// address (with loopback standing in for an unspecified address).
    #[must_use]
    pub fn base_url(&self) -> String {
        if let Some(url) = &self.public_base_url {
            return url.trim_end_matches('/').to_string();
        }
        let mut addr = self.local_addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(Ipv4Addr::LOCALHOST.into());
        }
        format!("http://{addr}")
    }

    /// The runtime being served.
    #[must_use]
    pub fn runtime(&self) -> &ServiceRuntime {
        &self.state.runtime
    }

    /// The readiness flag reported on `/ready`.
    #[must_use]
    pub fn readiness(&self) -> &ReadinessCheck {
        &self.state.readiness
    }

    /// Announces the hosted interfaces to the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Announce`] if the registry refuses.
    pub async fn announce(&self) -> ServerResult<usize> {
        let count = self.state.runtime.announce(&self.base_url()).await?;
        Ok(count)
    }

    /// Runs until SIGTERM or SIGINT.
    ///
    /// # Errors
    ///
    /// See [`Server::run_with_shutdown`].
    pub async fn run(self) -> ServerResult<()> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Announces the hosted interfaces, then serves until `shutdown` fires
    /// and drains open connections.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Announce`] if the interfaces cannot be
    /// announced; nothing is served in that case.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let announced = self.announce().await?;

        let Self {
            listener,
            local_addr,
            shutdown_timeout,
            state,
            ..
        } = self;

        info!(addr = %local_addr, interfaces = announced, "Server listening");

        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let state = Arc::clone(&state);
                            let token = tracker.acquire();
                            let shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                serve_connection(stream, peer, state, shutdown).await;
                                drop(token);
                            });
                        }
                        Err(e) => error!(error = %e, "Failed to accept connection"),
                    }
                }
                () = shutdown.recv() => {
                    info!("Shutdown signal received, stopping server");
                    break;
                }
            }
        }

        state.readiness.set_ready(false);

        info!(
            timeout = ?shutdown_timeout,
            connections = tracker.active_connections(),
            "Waiting for connections to close"
        );
        tokio::select! {
            () = tracker.wait_for_shutdown() => info!("All connections closed"),
            () = tokio::time::sleep(shutdown_timeout) => {
                warn!(
                    connections = tracker.active_connections(),
                    "Shutdown timeout reached with connections still open"
                );
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("public_base_url", &self.public_base_url)
            .field("runtime", &self.state.runtime)
            .finish_non_exhaustive()
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
    shutdown: ShutdownSignal,
) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let state = Arc::clone(&state);
        async move { Ok::<_, Infallible>(handle_request(req, &state).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        debug!(peer = %peer, error = %e, "Connection error");
    }
}

async fn handle_request(req: Request<Incoming>, state: &ServerState) -> HttpResponse {
    let (parts, body) = req.into_parts();

    match (&parts.method, parts.uri.path()) {
        (&Method::GET, "/health") => return json(StatusCode::OK, &state.health.status()),
        (&Method::GET, "/ready") => {
            let ready = state.readiness.is_ready();
            let status = if ready {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            return json(status, &serde_json::json!({ "ready": ready }));
        }
        (&Method::GET, "/metrics") => {
            if let Some(metrics) = iris_telemetry::render_metrics() {
                let mut response = Response::new(Full::new(Bytes::from(metrics)));
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                return response;
            }
        }
        _ => {}
    }

    let interaction_id = parts
        .headers
        .get(&X_INTERACTION_ID)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<InteractionId>().ok())
        .unwrap_or_default();

    let handled = tokio::time::timeout(state.request_timeout, async {
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(error = %e, "Failed to read request body");
                return failure(codes::PLATFORM_MALFORMED, interaction_id);
            }
        };
        state
            .runtime
            .handle_http(
                &parts.method,
                parts.uri.path(),
                parts.uri.query(),
                &parts.headers,
                &body,
            )
            .await
    })
    .await;

    match handled {
        Ok(raw) => into_http(raw),
        Err(_) => {
            warn!(method = %parts.method, path = %parts.uri.path(), "Request timed out");
            into_http(failure(codes::PLATFORM_TIMEOUT, interaction_id))
        }
    }
}

fn failure(code: &str, interaction_id: InteractionId) -> RawResponse {
    let mut errors = ErrorCollection::new();
    errors.add_error(code, None);
    render_errors(&errors, &interaction_id)
}

fn into_http(raw: RawResponse) -> HttpResponse {
    let mut response = Response::new(Full::new(raw.body));
    *response.status_mut() =
        StatusCode::from_u16(raw.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    *response.headers_mut() = raw.headers;
    response
}

fn json(status: StatusCode, payload: &impl serde::Serialize) -> HttpResponse {
    let body = serde_json::to_vec(payload).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(addr: &str) -> ServerConfig {
        ServerConfig {
            http_addr: addr.to_string(),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_picks_free_port() {
        let runtime = ServiceRuntime::builder().build().unwrap();
        let server = Server::bind(&config("127.0.0.1:0"), runtime).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.base_url(), format!("http://{}", server.local_addr()));
    }

    #[tokio::test]
    async fn test_unspecified_address_announces_loopback() {
        let runtime = ServiceRuntime::builder().build().unwrap();
        let server = Server::bind(&config("0.0.0.0:0"), runtime).await.unwrap();
        assert!(server.base_url().starts_with("http://127.0.0.1:"));
    }

    #[tokio::test]
    async fn test_public_base_url_wins() {
        let runtime = ServiceRuntime::builder().build().unwrap();
        let mut config = config("127.0.0.1:0");
        config.public_base_url = Some("https://widgets.example/".into());
        let server = Server::bind(&config, runtime).await.unwrap();
        assert_eq!(server.base_url(), "https://widgets.example");
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let runtime = ServiceRuntime::builder().build().unwrap();
        let error = Server::bind(&config("not an address"), runtime)
            .await
            .unwrap_err();
        assert!(matches!(error, ServerError::InvalidAddress { .. }));
    }

    #[test]
    fn test_into_http_keeps_status_and_headers() {
        let raw = failure(codes::PLATFORM_TIMEOUT, InteractionId::new());
        let response = into_http(raw);
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert!(response.headers().contains_key(&X_INTERACTION_ID));
    }
}
