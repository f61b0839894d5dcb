//! Message-queue transport.
//!
//! A queue call is an HTTP request in message form: the verb, path, headers,
//! query and body travel in a [`QueueMessage`] addressed to a named queue,
//! and the consumer answers with a [`QueueReply`]. The broker itself sits
//! behind the [`QueueBinding`] trait. [`InProcessQueue`] binds queue names
//! directly to runtimes in the same process.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use indexmap::IndexMap;
use iris_core::{IrisError, IrisResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{CallRequest, RawResponse, TransportFailure, TransportOutcome};
use crate::headers::outbound_headers;
use crate::resource::BoxFuture;
use crate::runtime::{ServiceRuntime, WeakRuntime};

/// A request sent over a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Queue the request is addressed to.
    pub queue_name: String,
    /// Path the request would have over HTTP, ident included.
    pub equivalent_path: String,
    /// HTTP verb.
    pub verb: String,
    /// Request headers.
    pub headers: IndexMap<String, String>,
    /// Query string without the leading `?`.
    pub query: String,
    /// JSON body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// A reply received over a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueReply {
    /// HTTP status.
    pub status: u16,
    /// Reply headers.
    pub headers: IndexMap<String, String>,
    /// Reply body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Queue failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// No reply within the timeout.
    #[error("queue request timed out")]
    TimedOut,

    /// Nobody consumes the queue.
    #[error("queue '{0}' is unreachable")]
    Unreachable(String),

    /// Anything else.
    #[error("queue error: {0}")]
    Other(String),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Request/reply access to a message queue.
pub trait QueueBinding: Send + Sync + fmt::Debug {
    /// Sends `message` and waits up to `timeout` for the reply.
    fn request<'a>(
        &'a self,
        message: QueueMessage,
        timeout: Duration,
    ) -> BoxFuture<'a, QueueResult<QueueReply>>;
}

/// A [`QueueBinding`] delivering messages to runtimes in this process.
///
/// Runtimes are held weakly so a runtime may be bound to a queue that it
/// also publishes to.
#[derive(Debug, Default)]
pub struct InProcessQueue {
    consumers: DashMap<String, WeakRuntime>,
}

impl InProcessQueue {
    /// Creates a queue with no consumers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `runtime` the consumer of `queue_name`.
    pub fn bind(&self, queue_name: impl Into<String>, runtime: &ServiceRuntime) {
        self.consumers.insert(queue_name.into(), runtime.downgrade());
    }

    /// Removes the consumer of `queue_name`.
    pub fn unbind(&self, queue_name: &str) -> bool {
        self.consumers.remove(queue_name).is_some()
    }
}

impl QueueBinding for InProcessQueue {
    fn request<'a>(
        &'a self,
        message: QueueMessage,
        timeout: Duration,
    ) -> BoxFuture<'a, QueueResult<QueueReply>> {
        Box::pin(async move {
            let runtime = self
                .consumers
                .get(&message.queue_name)
                .and_then(|consumer| consumer.upgrade())
                .ok_or_else(|| QueueError::Unreachable(message.queue_name.clone()))?;

            tokio::time::timeout(timeout, consume(&runtime, message))
                .await
                .map_err(|_| QueueError::TimedOut)
        })
    }
}

/// Handles a queue message with `runtime` and builds the reply.
pub async fn consume(runtime: &ServiceRuntime, message: QueueMessage) -> QueueReply {
    let Ok(method) = Method::from_bytes(message.verb.as_bytes()) else {
        return QueueReply {
            status: 405,
            headers: IndexMap::new(),
            body: None,
        };
    };

    let mut headers = HeaderMap::new();
    for (name, value) in &message.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }

    let query = (!message.query.is_empty()).then_some(message.query.as_str());
    let body = message.body.as_deref().unwrap_or_default().as_bytes();

    let raw = Box::pin(runtime.handle_http(&method, &message.equivalent_path, query, &headers, body)).await;

    QueueReply {
        status: raw.status,
        headers: raw
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect(),
        body: (!raw.body.is_empty()).then(|| String::from_utf8_lossy(&raw.body).into_owned()),
    }
}

/// Sends `request` over the queue named `queue_name`.
///
/// # Errors
///
/// Returns [`IrisError::Configuration`] if the runtime has no queue
/// binding.
pub async fn invoke(
    runtime: &ServiceRuntime,
    queue_name: &str,
    equivalent_path: &str,
    request: &CallRequest,
) -> IrisResult<TransportOutcome> {
    let Some(binding) = runtime.queue_binding() else {
        return Err(IrisError::configuration(
            "queue route selected but no queue binding present",
        ));
    };

    let body = match request.body_bytes() {
        Ok(body) => body.map(|body| String::from_utf8_lossy(&body).into_owned()),
        Err(e) => {
            return Ok(TransportOutcome::Failed(TransportFailure::Other(format!(
                "could not encode request body: {e}"
            ))))
        }
    };

    let headers = outbound_headers(
        &request.context,
        request.session.as_ref().map(|session| &session.session_id),
        &runtime.settings().default_locale,
    )
    .iter()
    .filter_map(|(name, value)| {
        value
            .to_str()
            .ok()
            .map(|value| (name.to_string(), value.to_string()))
    })
    .collect();

    let message = QueueMessage {
        queue_name: queue_name.to_string(),
        equivalent_path: format!(
            "{}{}",
            equivalent_path.trim_end_matches('/'),
            request.ident_path()
        ),
        verb: request.target.action.http_method().to_string(),
        headers,
        query: request.query(),
        body,
    };

    tracing::trace!(queue = %queue_name, path = %message.equivalent_path, "Sending queue request");

    let outcome = match binding
        .request(message, runtime.settings().queue_timeout)
        .await
    {
        Ok(reply) => TransportOutcome::Delivered(into_raw(reply)),
        Err(QueueError::TimedOut) => TransportOutcome::Failed(TransportFailure::TimedOut),
        Err(QueueError::Unreachable(reason)) => {
            TransportOutcome::Failed(TransportFailure::Unreachable(reason))
        }
        Err(QueueError::Other(reason)) => TransportOutcome::Failed(TransportFailure::Other(reason)),
    };
    Ok(outcome)
}

fn into_raw(reply: QueueReply) -> RawResponse {
    let mut headers = HeaderMap::new();
    for (name, value) in &reply.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    RawResponse {
        status: reply.status,
        headers,
        body: reply.body.map(Bytes::from).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoxFuture, Context, Interface, Resource};
    use serde_json::json;

    struct Widgets;

    impl Resource for Widgets {
        fn show<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move {
                let ident = ctx.request().ident.clone().unwrap_or_default();
                ctx.response_mut().set_resource(json!({"id": ident}));
                Ok(())
            })
        }
    }

    fn message(queue_name: &str, path: &str) -> QueueMessage {
        QueueMessage {
            queue_name: queue_name.into(),
            equivalent_path: path.into(),
            verb: "GET".into(),
            headers: IndexMap::new(),
            query: String::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn test_in_process_delivery() {
        let runtime = ServiceRuntime::builder()
            .interface(Interface::new("Widget", 1, "widgets", Widgets))
            .build()
            .unwrap();
        let queue = InProcessQueue::new();
        queue.bind("widgets.in", &runtime);

        let reply = queue
            .request(message("widgets.in", "/v1/widgets/w1"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(reply.status, 200);
        let body: serde_json::Value = serde_json::from_str(reply.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"id": "w1"}));
        assert!(reply.headers.contains_key("x-interaction-id"));
    }

    #[tokio::test]
    async fn test_unbound_queue_is_unreachable() {
        let queue = InProcessQueue::new();
        let error = queue
            .request(message("nobody", "/v1/widgets"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(error, QueueError::Unreachable("nobody".into()));
    }

    #[tokio::test]
    async fn test_dropped_runtime_is_unreachable() {
        let queue = InProcessQueue::new();
        {
            let runtime = ServiceRuntime::builder().build().unwrap();
            queue.bind("gone", &runtime);
        }
        assert!(matches!(
            queue
                .request(message("gone", "/v1/widgets"), Duration::from_secs(1))
                .await,
            Err(QueueError::Unreachable(_))
        ));
        assert!(queue.unbind("gone"));
    }

    #[tokio::test]
    async fn test_unknown_verb() {
        let runtime = ServiceRuntime::builder().build().unwrap();
        let mut message = message("q", "/v1/widgets");
        message.verb = "NOT A VERB".into();
        assert_eq!(consume(&runtime, message).await.status, 405);
    }

    #[test]
    fn test_message_json_shape() {
        let mut message = message("q", "/v1/widgets");
        message.headers.insert("x-session-id".into(), "s".into());
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["verb"], "GET");
        assert_eq!(value["headers"]["x-session-id"], "s");
        assert!(value.get("body").is_none());
    }
}
