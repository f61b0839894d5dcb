//! Transports.
//!
//! A located endpoint is invoked over one of three transports. Each returns
//! the raw reply (or why there was none) as a [`TransportOutcome`]; turning
//! that into a [`CallResult`](iris_core::CallResult) is left to the
//! [`ResultNormalizer`](crate::ResultNormalizer).

pub mod local;
pub mod queue;
pub mod remote;

use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;
use iris_core::{IrisResult, ListParameters, RequestSnapshot, Session, Target};
use iris_registry::EndpointLocation;
use serde_json::Value;

use crate::deriver::ChildRequestContext;
use crate::runtime::ServiceRuntime;

/// One inter-resource call, ready to send.
#[derive(Debug, Clone)]
pub struct CallRequest {
    /// What is called.
    pub target: Target,
    /// Derived request context.
    pub context: ChildRequestContext,
    /// Session the call runs under, possibly augmented.
    pub session: Option<Arc<Session>>,
    /// Instance identifier for show, update and delete.
    pub ident: Option<String>,
    /// JSON body for create and update.
    pub body: Option<Value>,
    /// List parameters.
    pub list: ListParameters,
}

impl CallRequest {
    /// The request as the callee sees it.
    #[must_use]
    pub fn to_snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            locale: self.context.locale.clone(),
            dated_at: self.context.dated_at,
            dated_from: self.context.dated_from,
            deja_vu: self.context.deja_vu,
            resource_uuid: self.context.resource_uuid,
            assume_identity_of: self.context.assume_identity_of.clone(),
            ident: self.ident.clone(),
            body: self.body.clone(),
            list: self.list.clone(),
        }
    }

    /// Path below the collection URI: `/{ident}` or nothing.
    #[must_use]
    pub fn ident_path(&self) -> String {
        self.ident
            .as_deref()
            .map(|ident| format!("/{}", urlencoding::encode(ident)))
            .unwrap_or_default()
    }

    /// Query string for list calls; empty otherwise.
    #[must_use]
    pub fn query(&self) -> String {
        if self.target.action.returns_collection() {
            self.list.to_query_string()
        } else {
            String::new()
        }
    }

    /// The JSON body, if the action carries one.
    pub fn body_bytes(&self) -> serde_json::Result<Option<Vec<u8>>> {
        match &self.body {
            Some(body) if self.target.action.takes_body() => serde_json::to_vec(body).map(Some),
            _ => Ok(None),
        }
    }
}

/// A reply as received.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status.
    pub status: u16,
    /// Reply headers.
    pub headers: HeaderMap,
    /// Reply body, possibly empty.
    pub body: Bytes,
}

/// Why no reply arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// Nothing is listening at the location.
    Unreachable(String),
    /// The call ran out of time.
    TimedOut,
    /// Anything else.
    Other(String),
}

/// What a transport produced.
#[derive(Debug, Clone)]
pub enum TransportOutcome {
    /// A reply arrived.
    Delivered(RawResponse),
    /// No reply arrived.
    Failed(TransportFailure),
}

impl TransportOutcome {
    /// Short label for metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered(raw) if (200..300).contains(&raw.status) => "success",
            Self::Delivered(_) => "error",
            Self::Failed(TransportFailure::Unreachable(_)) => "unreachable",
            Self::Failed(TransportFailure::TimedOut) => "timeout",
            Self::Failed(TransportFailure::Other(_)) => "failed",
        }
    }
}

/// Sends `request` to `location`.
///
/// # Errors
///
/// Only fatal problems are errors: a queue route with no queue binding,
/// or an `Err` from a locally dispatched implementation.
pub async fn invoke(
    runtime: &ServiceRuntime,
    location: &EndpointLocation,
    request: &CallRequest,
) -> IrisResult<TransportOutcome> {
    match location {
        EndpointLocation::Local => local::invoke(runtime, request).await,
        EndpointLocation::Http { base_uri } => Ok(remote::invoke(runtime, base_uri, request).await),
        EndpointLocation::Queue {
            queue_name,
            equivalent_path,
        } => queue::invoke(runtime, queue_name, equivalent_path, request).await,
    }
}
