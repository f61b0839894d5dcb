//! Registry RPC server.
//!
//! Serves a [`ServiceRegistry`] as JSON over HTTP:
//!
//! | Route | Request | Response |
//! |-------|---------|----------|
//! | `POST /add` | `{"resource","version","uri"}` | `{"ok":true}` |
//! | `POST /find` | `{"resource","version"}` | `{"uri":string\|null}` |
//! | `GET\|POST /ping` | - | `{"pong":true}` |
//! | `POST /stop` | - | `{"ok":true}`, then shutdown |

use std::convert::Infallible;
use std::net::SocketAddr;
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
use iris_core::ShutdownSignal;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::registry::{InMemoryRegistry, RegistryKey, ServiceRegistry};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct AddRequest {
    resource: String,
    version: u32,
    uri: String,
}

/// A bound registry server.
#[derive(Debug)]
pub struct RegistryServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<InMemoryRegistry>,
    shutdown: ShutdownSignal,
}

impl RegistryServer {
    /// Binds to `addr`; port 0 picks a free port.
    ///
    /// `POST /stop`, or triggering `shutdown`, stops the server.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Server` if the address is invalid or in use.
    pub async fn bind(addr: &str, shutdown: ShutdownSignal) -> RegistryResult<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| RegistryError::config(format!("invalid listen address '{addr}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RegistryError::server(format!("failed to bind to {addr}: {e}")))?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            registry: Arc::new(InMemoryRegistry::with_shutdown(shutdown.clone())),
            shutdown,
        })
    }

    /// The address actually bound.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The registry being served, for in-process use alongside the RPC.
    #[must_use]
    pub fn registry(&self) -> Arc<InMemoryRegistry> {
        Arc::clone(&self.registry)
    }

    /// Serves until shutdown, then drains open connections.
    ///
    /// # Errors
    ///
    /// Currently infallible once bound; the signature leaves room for
    /// listener failures to be reported.
    pub async fn run(self) -> RegistryResult<()> {
        let Self {
            listener,
            local_addr,
            registry,
            shutdown,
        } = self;

        info!(addr = %local_addr, "Registry listening");

        let mut connections = tokio::task::JoinSet::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let registry = Arc::clone(&registry);
                            let shutdown = shutdown.clone();
                            connections.spawn(async move {
                                serve_connection(stream, peer, registry, shutdown).await;
                            });
                        }
                        Err(e) => error!(error = %e, "Failed to accept registry connection"),
                    }
                }
                () = shutdown.recv() => {
                    info!("Registry shutting down");
                    break;
                }
            }
        }

        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            warn!("Registry connections still open after drain timeout");
        }

        info!("Registry stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    registry: Arc<InMemoryRegistry>,
    shutdown: ShutdownSignal,
) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let registry = Arc::clone(&registry);
        async move { Ok::<_, Infallible>(handle_request(req, registry.as_ref()).await) }
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
        debug!(peer = %peer, error = %e, "Registry connection error");
    }
}

async fn handle_request(req: Request<Incoming>, registry: &dyn ServiceRegistry) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "Failed to read registry request body");
            return json_response(StatusCode::BAD_REQUEST, &json!({"error": "unreadable body"}));
        }
    };

    let (status, payload) = handle_rpc(registry, &method, &path, &body).await;
    json_response(status, &payload)
}

/// Executes one RPC against `registry`.
pub(crate) async fn handle_rpc(
    registry: &dyn ServiceRegistry,
    method: &Method,
    path: &str,
    body: &[u8],
) -> (StatusCode, Value) {
    let result = match (method, path) {
        (&Method::POST, "/add") => match serde_json::from_slice::<AddRequest>(body) {
            Ok(request) => {
                let key = RegistryKey::new(request.resource, request.version);
                debug!(key = %key, uri = %request.uri, "Registry add");
                registry.add(&key, &request.uri).await.map(|()| json!({"ok": true}))
            }
            Err(e) => return bad_request(&e),
        },
        (&Method::POST, "/find") => match serde_json::from_slice::<RegistryKey>(body) {
            Ok(key) => registry.find(&key).await.map(|uri| json!({ "uri": uri })),
            Err(e) => return bad_request(&e),
        },
        (&Method::GET | &Method::POST, "/ping") => {
            registry.ping().await.map(|pong| json!({ "pong": pong }))
        }
        (&Method::POST, "/stop") => registry.stop().await.map(|()| json!({"ok": true})),
        (_, "/add" | "/find" | "/ping" | "/stop") => {
            return (
                StatusCode::METHOD_NOT_ALLOWED,
                json!({"error": format!("{method} not allowed on {path}")}),
            )
        }
        _ => {
            return (
                StatusCode::NOT_FOUND,
                json!({"error": format!("unknown registry route: {path}")}),
            )
        }
    };

    match result {
        Ok(payload) => (StatusCode::OK, payload),
        Err(e) => {
            error!(error = %e, path = %path, "Registry RPC failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": e.to_string()}),
            )
        }
    }
}

fn bad_request(error: &serde_json::Error) -> (StatusCode, Value) {
    (
        StatusCode::BAD_REQUEST,
        json!({"error": format!("malformed registry request: {error}")}),
    )
}

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
