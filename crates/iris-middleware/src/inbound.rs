//! Inbound request parsing.
//!
//! Requests arrive as `/v{version}/{endpoint}[/{ident}]` with the verb
//! selecting the action, the inter-resource headers carrying the request
//! context, the query string carrying list parameters and a JSON body for
//! create and update.

use http::Method;
use iris_core::{
    codes, Action, ErrorCollection, ListParameters, MalformedQuery, Reference, RequestSnapshot,
};
use serde_json::Value;
use thiserror::Error;

use crate::headers::{InboundHeaders, MalformedHeader};

/// A parsed inbound request.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Interface version from the path.
    pub version: u32,
    /// Endpoint segment from the path.
    pub endpoint: String,
    /// Instance identifier from the path.
    pub ident: Option<String>,
    /// Action selected by verb and path.
    pub action: Action,
    /// Inter-resource headers.
    pub headers: InboundHeaders,
    /// List parameters.
    pub list: ListParameters,
    /// JSON body.
    pub body: Option<Value>,
}

/// Why an inbound request could not be parsed.
#[derive(Debug, Error)]
pub enum InboundRejection {
    /// The path is not an interface path.
    #[error("no interface at '{0}'")]
    NotFound(String),

    /// The verb and path select no action.
    #[error("{method} not allowed here")]
    MethodNotAllowed {
        /// The verb used.
        method: Method,
    },

    /// A header could not be parsed.
    #[error(transparent)]
    Header(#[from] MalformedHeader),

    /// The query string could not be parsed.
    #[error(transparent)]
    Query(#[from] MalformedQuery),

    /// The body is not JSON.
    #[error("malformed body: {0}")]
    Body(#[from] serde_json::Error),
}

impl InboundRejection {
    /// The errors reported to the caller.
    #[must_use]
    pub fn to_errors(&self) -> ErrorCollection {
        let mut errors = ErrorCollection::new();
        match self {
            Self::NotFound(path) => {
                errors.add_error(
                    codes::PLATFORM_NOT_FOUND,
                    Some(Reference::new().with("path", path)),
                );
            }
            Self::MethodNotAllowed { .. } => {
                errors.add_error(codes::PLATFORM_METHOD_NOT_ALLOWED, None);
            }
            Self::Header(MalformedHeader(name)) => {
                errors.add_error(
                    codes::PLATFORM_MALFORMED,
                    Some(Reference::new().with("header", name)),
                );
            }
            Self::Query(e) => {
                errors.add_error_with_message(
                    codes::PLATFORM_MALFORMED,
                    e.to_string(),
                    None,
                );
            }
            Self::Body(e) => {
                errors.add_error_with_message(codes::GENERIC_MALFORMED, e.to_string(), None);
            }
        }
        errors
    }
}

impl InboundRequest {
    /// Parses a request.
    pub fn parse(
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &http::HeaderMap,
        body: &[u8],
    ) -> Result<Self, InboundRejection> {
        let (version, endpoint, ident) =
            parse_path(path).ok_or_else(|| InboundRejection::NotFound(path.to_string()))?;

        let action = Action::from_http(method, ident.is_some()).ok_or_else(|| {
            InboundRejection::MethodNotAllowed {
                method: method.clone(),
            }
        })?;

        let headers = InboundHeaders::parse(headers)?;

        let list = match query {
            Some(query) if action.returns_collection() => ListParameters::from_query_string(query)?,
            _ => ListParameters::default(),
        };

        let body = if action.takes_body() && !body.iter().all(u8::is_ascii_whitespace) {
            Some(serde_json::from_slice(body)?)
        } else {
            None
        };

        Ok(Self {
            version,
            endpoint,
            ident,
            action,
            headers,
            list,
            body,
        })
    }

    /// The request as a [`RequestSnapshot`], defaulting the locale.
    #[must_use]
    pub fn into_snapshot(self, default_locale: &str) -> RequestSnapshot {
        RequestSnapshot {
            locale: self
                .headers
                .locale
                .unwrap_or_else(|| default_locale.to_string()),
            dated_at: self.headers.dated_at,
            dated_from: self.headers.dated_from,
            deja_vu: self.headers.deja_vu,
            resource_uuid: self.headers.resource_uuid,
            assume_identity_of: self.headers.assume_identity_of,
            ident: self.ident,
            body: self.body,
            list: self.list,
        }
    }
}

/// Splits `/v{version}/{endpoint}[/{ident}]`.
fn parse_path(path: &str) -> Option<(u32, String, Option<String>)> {
    let mut segments = path.trim_matches('/').split('/');

    let version = segments.next()?.strip_prefix('v')?.parse().ok()?;
    let endpoint = segments.next().filter(|s| !s.is_empty())?.to_string();
    let ident = match segments.next() {
        Some(ident) if !ident.is_empty() => Some(urlencoding::decode(ident).ok()?.into_owned()),
        _ => None,
    };
    if segments.next().is_some() {
        return None;
    }

    Some((version, endpoint, ident))
}
