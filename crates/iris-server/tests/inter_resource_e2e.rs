//! End-to-end tests of inter-resource calls between two HTTP servers.
//!
//! `ServiceCallsA` and `ServiceCallsB` run in separate servers that share a
//! service registry and, optionally, a session store. B calls A over HTTP;
//! the test client calls B.

use std::sync::Arc;
use std::time::Duration;

use iris_config::ServerConfig;
use iris_core::{
    codes, Action, InteractionId, Permissions, Policy, Reference, Session, ShutdownSignal,
};
use iris_middleware::headers::{X_DEJA_VU, X_INTERACTION_ID, X_SESSION_ID};
use iris_middleware::{BoxFuture, Context, Interface, Resource, RuntimeSettings, ServiceRuntime};
use iris_registry::{InMemoryRegistry, RegistryKey, ServiceRegistry};
use iris_server::Server;
use iris_session::{InMemorySessionStore, SessionStore};
use serde_json::{json, Value};

const OUTBOUND_TIMEOUT: Duration = Duration::from_millis(500);

struct ServiceCallsA;

impl Resource for ServiceCallsA {
    fn list<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let offset = ctx.request().list.offset;
            if offset == 42 {
                ctx.response_mut().add_error(
                    "service_calls_a.triggered",
                    Some(Reference::new().with("offset", offset)),
                );
            } else {
                ctx.response_mut()
                    .set_resources(vec![json!({"offset": offset})]);
            }
            Ok(())
        })
    }

    fn show<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            match ctx.request().ident.as_deref() {
                Some("hello_world") => {
                    ctx.response_mut().set_resource(json!({"inner": "shown"}));
                }
                Some("slow") => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Some("session") => {
                    let session_id = ctx.session().map(|s| s.session_id.to_string());
                    ctx.response_mut()
                        .set_resource(json!({"session_id": session_id}));
                }
                _ => {
                    let locale = ctx.request().locale.clone();
                    ctx.response_mut().set_resource(json!({"locale": locale}));
                }
            }
            Ok(())
        })
    }

    fn create<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            ctx.response_mut()
                .add_error(codes::GENERIC_INVALID_DUPLICATION, None);
            Ok(())
        })
    }
}

struct ServiceCallsB;

impl Resource for ServiceCallsB {
    fn list<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let list = ctx.request().list.clone();
            let result = ctx.resource("ServiceCallsA", 1).list(&list).await?;
            if result.has_errors() {
                ctx.response_mut().errors.merge(result.platform_errors());
            } else if let Some(collection) = result.as_collection() {
                ctx.response_mut().set_resources(collection.items.clone());
            }
            Ok(())
        })
    }

    fn show<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let ident = ctx.request().ident.clone().unwrap_or_default();
            let result = ctx.resource("ServiceCallsA", 1).show(&ident).await?;
            if result.has_errors() {
                ctx.response_mut().errors.merge(result.platform_errors());
            } else {
                ctx.response_mut()
                    .set_resource(json!({"result": result.to_json()}));
            }
            Ok(())
        })
    }

    fn create<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let deja_vu = ctx.request().deja_vu;
            let body = ctx.request().body.clone().unwrap_or(Value::Null);
            let mut endpoint = ctx.resource("ServiceCallsA", 1);
            endpoint.set_deja_vu(deja_vu);
            let result = endpoint.create(body).await?;
            ctx.response_mut().errors.merge(result.platform_errors());
            ctx.response_mut()
                .set_resource(json!({"created": !result.has_errors()}));
            Ok(())
        })
    }
}

struct Pair {
    a_url: String,
    b_url: String,
    registry: Arc<InMemoryRegistry>,
    shutdown: ShutdownSignal,
}

impl Drop for Pair {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

fn local_config() -> ServerConfig {
    ServerConfig {
        http_addr: "127.0.0.1:0".to_string(),
        shutdown_timeout_secs: 1,
        ..ServerConfig::default()
    }
}

async fn start(runtime: ServiceRuntime, config: &ServerConfig, shutdown: &ShutdownSignal) -> String {
    let server = Server::bind(config, runtime).await.unwrap();
    // Announce before serving so callers can locate the server immediately.
    server.announce().await.unwrap();
    let url = server.base_url();
    tokio::spawn(server.run_with_shutdown(shutdown.clone()));
    url
}

async fn start_pair() -> Pair {
    start_pair_with(None).await
}

/// Starts A and B. B may show A on behalf of any caller allowed to show B.
async fn start_pair_with(store: Option<Arc<InMemorySessionStore>>) -> Pair {
    let registry = Arc::new(InMemoryRegistry::new());
    let shutdown = ShutdownSignal::new();

    let mut a = ServiceRuntime::builder()
        .interface(
            Interface::new("ServiceCallsA", 1, "service_calls_a", ServiceCallsA).with_domain_error(
                "service_calls_a",
                "triggered",
                412,
                "Offset 42 triggers an error",
            ),
        )
        .registry(registry.clone());
    if let Some(store) = &store {
        a = a.session_store(store.clone());
    }
    let a_url = start(a.build().unwrap(), &local_config(), &shutdown).await;

    let mut b = ServiceRuntime::builder()
        .interface(
            Interface::new("ServiceCallsB", 1, "service_calls_b", ServiceCallsB)
                .with_additional_permissions(
                    Action::Show,
                    Permissions::new().with_resource("ServiceCallsA", Action::Show, Policy::Allow),
                ),
        )
        .settings(RuntimeSettings {
            http_timeout: OUTBOUND_TIMEOUT,
            ..RuntimeSettings::default()
        })
        .registry(registry.clone());
    if let Some(store) = &store {
        b = b.session_store(store.clone());
    }
    let b_url = start(b.build().unwrap(), &local_config(), &shutdown).await;

    Pair {
        a_url,
        b_url,
        registry,
        shutdown,
    }
}

async fn get(url: &str) -> (u16, reqwest::header::HeaderMap, Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.json().await.unwrap_or(Value::Null);
    (status, headers, body)
}

#[tokio::test]
async fn test_show_over_http() {
    let pair = start_pair().await;

    let (status, _, body) = get(&format!("{}/v1/service_calls_b/hello_world", pair.b_url)).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"result": {"inner": "shown"}}));
}

#[tokio::test]
async fn test_downstream_error_over_http() {
    let pair = start_pair().await;

    let (status, _, body) = get(&format!("{}/v1/service_calls_b?offset=42", pair.b_url)).await;
    assert_eq!(status, 412);
    assert_eq!(body["kind"], "Errors");
    assert_eq!(body["errors"][0]["code"], "service_calls_a.triggered");
    assert_eq!(body["errors"][0]["reference"], "42");
}

#[tokio::test]
async fn test_list_envelope_over_http() {
    let pair = start_pair().await;

    let (status, _, body) = get(&format!("{}/v1/service_calls_b?offset=7", pair.b_url)).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"_data": [{"offset": 7}]}));
}

#[tokio::test]
async fn test_locale_propagates_over_http() {
    let pair = start_pair().await;

    let response = reqwest::Client::new()
        .get(format!("{}/v1/service_calls_b/other", pair.b_url))
        .header("Content-Language", "fr")
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"result": {"locale": "fr"}}));
}

#[tokio::test]
async fn test_interaction_id_echoed() {
    let pair = start_pair().await;
    let id = InteractionId::new();

    let response = reqwest::Client::new()
        .get(format!("{}/v1/service_calls_b/hello_world", pair.b_url))
        .header(X_INTERACTION_ID.as_str(), id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers().get(X_INTERACTION_ID.as_str()).unwrap(),
        id.to_string().as_str()
    );
}

#[tokio::test]
async fn test_unknown_path_and_health() {
    let pair = start_pair().await;

    let (status, _, body) = get(&format!("{}/v1/nothing_here", pair.b_url)).await;
    assert_eq!(status, 404);
    assert_eq!(body["errors"][0]["code"], codes::PLATFORM_NOT_FOUND);

    let (status, _, body) = get(&format!("{}/health", pair.b_url)).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["interfaces"], json!(["ServiceCallsB/v1"]));
}

#[tokio::test]
async fn test_dead_endpoint_is_not_found() {
    let pair = start_pair().await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);
    pair.registry
        .add(
            &RegistryKey::new("ServiceCallsA", 1),
            &format!("http://{dead}/v1/service_calls_a"),
        )
        .await
        .unwrap();

    let (status, _, body) = get(&format!("{}/v1/service_calls_b/hello_world", pair.b_url)).await;
    assert_eq!(status, 404);
    assert_eq!(body["errors"][0]["code"], codes::PLATFORM_NOT_FOUND);
    assert_eq!(
        body["errors"][0]["reference"],
        "v1 of ServiceCallsA interface endpoint"
    );
}

#[tokio::test]
async fn test_deja_vu_over_http() {
    let pair = start_pair().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/v1/service_calls_a", pair.a_url))
        .header(X_DEJA_VU.as_str(), "yes")
        .json(&json!({"name": "dup"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);
    assert_eq!(response.headers().get(X_DEJA_VU.as_str()).unwrap(), "confirmed");

    let response = client
        .post(format!("{}/v1/service_calls_b", pair.b_url))
        .header(X_DEJA_VU.as_str(), "yes")
        .json(&json!({"name": "dup"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"created": true}));

    let response = client
        .post(format!("{}/v1/service_calls_b", pair.b_url))
        .json(&json!({"name": "dup"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["errors"][0]["code"], codes::GENERIC_INVALID_DUPLICATION);
}

#[tokio::test]
async fn test_augmented_session_crosses_http() {
    let store = Arc::new(InMemorySessionStore::new());
    store.register_caller("caller", 1);
    let pair = start_pair_with(Some(store.clone())).await;

    let session = Session::new("caller", 1, chrono::Duration::minutes(5)).with_permissions(
        Permissions::new().with_resource("ServiceCallsB", Action::Show, Policy::Allow),
    );
    store.save(&session).await.unwrap();
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/v1/service_calls_a/session", pair.a_url))
        .header(X_SESSION_ID.as_str(), session.session_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let writes = store.writes();
    let response = client
        .get(format!("{}/v1/service_calls_b/session", pair.b_url))
        .header(X_SESSION_ID.as_str(), session.session_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    let seen_by_a = body["result"]["session_id"].as_str().unwrap().to_string();
    assert_ne!(seen_by_a, session.session_id.to_string());
    assert_eq!(store.writes(), writes + 1);

    // An outdated caller invalidates the augmented session too.
    store.register_caller("caller", 2);
    let response = client
        .get(format!("{}/v1/service_calls_a/session", pair.a_url))
        .header(X_SESSION_ID.as_str(), seen_by_a)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn test_outbound_http_timeout() {
    let pair = start_pair().await;

    let started = std::time::Instant::now();
    let (status, _, body) = get(&format!("{}/v1/service_calls_b/slow", pair.b_url)).await;
    assert_eq!(status, 408);
    assert_eq!(body["errors"][0]["code"], codes::PLATFORM_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_request_timeout() {
    let shutdown = ShutdownSignal::new();
    let runtime = ServiceRuntime::builder()
        .interface(Interface::new("ServiceCallsA", 1, "service_calls_a", ServiceCallsA))
        .build()
        .unwrap();
    let config = ServerConfig {
        request_timeout_ms: 50,
        ..local_config()
    };
    let url = start(runtime, &config, &shutdown).await;

    let (status, _, body) = get(&format!("{url}/v1/service_calls_a/slow")).await;
    assert_eq!(status, 408);
    assert_eq!(body["errors"][0]["code"], codes::PLATFORM_TIMEOUT);
    shutdown.trigger();
}

#[tokio::test]
async fn test_shutdown_stops_server() {
    let shutdown = ShutdownSignal::new();
    let runtime = ServiceRuntime::builder().build().unwrap();
    let server = Server::bind(&local_config(), runtime).await.unwrap();
    let readiness = server.readiness().clone();
    let handle = tokio::spawn(server.run_with_shutdown(shutdown.clone()));

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server should stop")
        .expect("server task should not panic")
        .expect("server should stop cleanly");
    assert!(!readiness.is_ready());
}
