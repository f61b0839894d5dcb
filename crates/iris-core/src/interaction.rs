//! Interactions.
//!
//! An [`Interaction`] is the context of one inbound or inter-resource call:
//! its identifiers, the session it runs under, a snapshot of the request and
//! the response being accumulated. Interactions are never persisted.

use crate::action::Action;
use crate::collection::{ErrorCollection, Reference};
use crate::descriptions::ErrorDescriptions;
use crate::identity::AssumedIdentity;
use crate::session::Session;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

/// Locale assumed when a request names none.
pub const DEFAULT_LOCALE: &str = "en-nz";

/// Page size used when a list request names none.
pub const DEFAULT_LIMIT: u64 = 50;

/// A unique interaction identifier, using UUID v7.
///
/// # Example
///
/// ```
/// use iris_core::InteractionId;
///
/// let a = InteractionId::new();
/// let b = InteractionId::new();
/// assert_ne!(a, b);
/// assert_eq!(a.to_string().parse::<InteractionId>().unwrap(), a);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionId(Uuid);

impl InteractionId {
    /// Creates a new time-ordered interaction id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for InteractionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InteractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InteractionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A query parameter that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed query parameter '{name}'")]
pub struct MalformedQuery {
    /// Parameter name.
    pub name: String,
}

impl MalformedQuery {
    fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Paging, sorting, search and filter parameters of a list request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParameters {
    /// Index of the first item.
    pub offset: u64,
    /// Maximum number of items.
    pub limit: u64,
    /// Sort key.
    pub sort: Option<String>,
    /// Sort direction.
    pub direction: Option<String>,
    /// Search terms.
    pub search: IndexMap<String, String>,
    /// Filter terms.
    pub filter: IndexMap<String, String>,
}

impl Default for ListParameters {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
            sort: None,
            direction: None,
            search: IndexMap::new(),
            filter: IndexMap::new(),
        }
    }
}

impl ListParameters {
    /// Creates default parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the offset.
    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the limit.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the sort key and direction.
    #[must_use]
    pub fn with_sort(mut self, sort: impl Into<String>, direction: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self.direction = Some(direction.into());
        self
    }

    /// Adds a search term.
    #[must_use]
    pub fn with_search(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.search.insert(key.into(), value.into());
        self
    }

    /// Adds a filter term.
    #[must_use]
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter.insert(key.into(), value.into());
        self
    }

    /// Encodes the parameters as a query string, omitting defaults.
    ///
    /// Search and filter maps are nested form-encoded strings, so
    /// `search: {offset: 42}` becomes `search=offset%3D42`.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        let mut pairs: Vec<(String, String)> = Vec::new();
        if self.offset != 0 {
            pairs.push(("offset".into(), self.offset.to_string()));
        }
        if self.limit != DEFAULT_LIMIT {
            pairs.push(("limit".into(), self.limit.to_string()));
        }
        if let Some(sort) = &self.sort {
            pairs.push(("sort".into(), sort.clone()));
        }
        if let Some(direction) = &self.direction {
            pairs.push(("direction".into(), direction.clone()));
        }
        if !self.search.is_empty() {
            pairs.push(("search".into(), encode_form(&self.search)));
        }
        if !self.filter.is_empty() {
            pairs.push(("filter".into(), encode_form(&self.filter)));
        }
        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Parses a query string produced by [`to_query_string`](Self::to_query_string).
    ///
    /// Unknown parameters are ignored.
    pub fn from_query_string(query: &str) -> Result<Self, MalformedQuery> {
        let mut params = Self::default();
        for (name, value) in decode_form(query).map_err(|()| MalformedQuery::new("query"))? {
            match name.as_str() {
                "offset" => {
                    params.offset = value.parse().map_err(|_| MalformedQuery::new(&name))?;
                }
                "limit" => {
                    params.limit = value
                        .parse()
                        .ok()
                        .filter(|limit| *limit > 0)
                        .ok_or_else(|| MalformedQuery::new(&name))?;
                }
                "sort" => params.sort = Some(value),
                "direction" => params.direction = Some(value),
                "search" => {
                    params.search = decode_form(&value).map_err(|()| MalformedQuery::new(&name))?;
                }
                "filter" => {
                    params.filter = decode_form(&value).map_err(|()| MalformedQuery::new(&name))?;
                }
                _ => {}
            }
        }
        Ok(params)
    }
}

fn encode_form(map: &IndexMap<String, String>) -> String {
    map.iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn decode_form(input: &str) -> Result<IndexMap<String, String>, ()> {
    let mut map = IndexMap::new();
    for pair in input.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let (key, value) = (key.replace('+', " "), value.replace('+', " "));
        let key = urlencoding::decode(&key).map_err(|_| ())?.into_owned();
        let value = urlencoding::decode(&value).map_err(|_| ())?.into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

/// Snapshot of the request side of an interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSnapshot {
    /// Content locale.
    pub locale: String,
    /// Historic-read point in time.
    pub dated_at: Option<DateTime<Utc>>,
    /// Backdated-write point in time.
    pub dated_from: Option<DateTime<Utc>>,
    /// Whether duplicate-creation conflicts should be reported as success.
    pub deja_vu: bool,
    /// Caller-chosen UUID for a created instance.
    pub resource_uuid: Option<Uuid>,
    /// Identity assumed for this request.
    pub assume_identity_of: Option<AssumedIdentity>,
    /// Instance identifier for show, update and delete.
    pub ident: Option<String>,
    /// JSON body for create and update.
    pub body: Option<Value>,
    /// List parameters.
    pub list: ListParameters,
}

impl Default for RequestSnapshot {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            dated_at: None,
            dated_from: None,
            deja_vu: false,
            resource_uuid: None,
            assume_identity_of: None,
            ident: None,
            body: None,
            list: ListParameters::default(),
        }
    }
}

/// The resource, version and action an interaction addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Resource name, e.g. `ServiceCallsA`.
    pub resource: String,
    /// Interface version.
    pub version: u32,
    /// Action performed.
    pub action: Action,
}

impl Target {
    /// Creates a target.
    #[must_use]
    pub fn new(resource: impl Into<String>, version: u32, action: Action) -> Self {
        Self {
            resource: resource.into(),
            version,
            action,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} v{}", self.resource, self.action, self.version)
    }
}

/// The body an implementation has set on its response.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseBody {
    /// Nothing set.
    #[default]
    Empty,
    /// A single resource representation.
    Resource(Value),
    /// A page of resource representations.
    Collection {
        /// Items on this page.
        items: Vec<Value>,
        /// Total number of items across all pages, if known.
        dataset_size: Option<u64>,
        /// Estimated total, if only an estimate is known.
        estimated_dataset_size: Option<u64>,
    },
}

/// The response side of an interaction.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// Accumulated errors.
    pub errors: ErrorCollection,
    body: ResponseBody,
    headers: IndexMap<String, String>,
}

impl Response {
    /// Creates an empty response resolving error codes against `descriptions`.
    #[must_use]
    pub fn new(descriptions: Arc<ErrorDescriptions>) -> Self {
        Self {
            errors: ErrorCollection::with_descriptions(descriptions),
            body: ResponseBody::Empty,
            headers: IndexMap::new(),
        }
    }

    /// Sets a single-resource body.
    pub fn set_resource(&mut self, resource: Value) {
        self.body = ResponseBody::Resource(resource);
    }

    /// Sets a collection body.
    pub fn set_resources(&mut self, items: Vec<Value>) {
        self.body = ResponseBody::Collection {
            items,
            dataset_size: None,
            estimated_dataset_size: None,
        };
    }

    /// Records the total dataset size of a collection body.
    pub fn set_dataset_size(&mut self, size: u64) {
        if let ResponseBody::Collection { dataset_size, .. } = &mut self.body {
            *dataset_size = Some(size);
        }
    }

    /// Records an estimated dataset size of a collection body.
    pub fn set_estimated_dataset_size(&mut self, size: u64) {
        if let ResponseBody::Collection {
            estimated_dataset_size,
            ..
        } = &mut self.body
        {
            *estimated_dataset_size = Some(size);
        }
    }

    /// Adds an error.
    pub fn add_error(&mut self, code: &str, reference: Option<Reference>) {
        self.errors.add_error(code, reference);
    }

    /// Adds an extra response header.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// The body set so far.
    #[must_use]
    pub const fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Extra headers set so far.
    #[must_use]
    pub const fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    /// Returns `true` once errors have been recorded.
    #[must_use]
    pub fn halt_processing(&self) -> bool {
        self.errors.has_errors()
    }
}

/// One call's context.
#[derive(Debug)]
pub struct Interaction {
    /// This interaction's id.
    pub id: InteractionId,
    /// Id of the interaction that started the call chain.
    pub owning_id: InteractionId,
    /// What is being called.
    pub target: Target,
    /// The session, if any.
    pub session: Option<Arc<Session>>,
    /// The request.
    pub request: RequestSnapshot,
    /// The response being accumulated.
    pub response: Response,
    started_at: Instant,
}

impl Interaction {
    /// Creates the top-level interaction of a call chain.
    #[must_use]
    pub fn new(
        target: Target,
        session: Option<Arc<Session>>,
        request: RequestSnapshot,
        descriptions: Arc<ErrorDescriptions>,
    ) -> Self {
        let id = InteractionId::new();
        Self::with_ids(id, id, target, session, request, descriptions)
    }

    /// Creates an interaction with explicit ids, for hops of a call chain.
    #[must_use]
    pub fn with_ids(
        id: InteractionId,
        owning_id: InteractionId,
        target: Target,
        session: Option<Arc<Session>>,
        request: RequestSnapshot,
        descriptions: Arc<ErrorDescriptions>,
    ) -> Self {
        Self {
            id,
            owning_id,
            target,
            session,
            request,
            response: Response::new(descriptions),
            started_at: Instant::now(),
        }
    }

    /// Time since the interaction started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptions::codes;

    #[test]
    fn test_list_query_round_trip() {
        let params = ListParameters::new()
            .with_offset(42)
            .with_limit(10)
            .with_sort("created_at", "desc")
            .with_search("offset", "42")
            .with_filter("name", "a&b=c");
        let query = params.to_query_string();
        assert!(query.contains("search=offset%3D42"));
        assert_eq!(ListParameters::from_query_string(&query), Ok(params));
    }

    #[test]
    fn test_list_query_decodes_plus_as_space() {
        let params = ListParameters::from_query_string("sort=created+at&search=name%3Dtwo+words").unwrap();
        assert_eq!(params.sort.as_deref(), Some("created at"));
        assert_eq!(params.search.get("name").map(String::as_str), Some("two words"));
    }

    #[test]
    fn test_default_list_query_is_empty() {
        assert_eq!(ListParameters::new().to_query_string(), "");
        assert_eq!(
            ListParameters::from_query_string(""),
            Ok(ListParameters::new())
        );
    }

    #[test]
    fn test_list_query_rejects_bad_numbers() {
        assert_eq!(
            ListParameters::from_query_string("offset=minus"),
            Err(MalformedQuery {
                name: "offset".into()
            })
        );
        assert!(ListParameters::from_query_string("limit=0").is_err());
    }

    #[test]
    fn test_request_defaults() {
        let request = RequestSnapshot::default();
        assert_eq!(request.locale, DEFAULT_LOCALE);
        assert!(!request.deja_vu);
        assert_eq!(request.list.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn test_response_dataset_size_only_for_collections() {
        let mut response = Response::default();
        response.set_dataset_size(3);
        assert_eq!(response.body(), &ResponseBody::Empty);

        response.set_resources(vec![Value::from(1)]);
        response.set_dataset_size(3);
        assert_eq!(
            response.body(),
            &ResponseBody::Collection {
                items: vec![Value::from(1)],
                dataset_size: Some(3),
                estimated_dataset_size: None,
            }
        );
    }

    #[test]
    fn test_response_halts_on_error() {
        let mut response = Response::default();
        assert!(!response.halt_processing());
        response.add_error(codes::PLATFORM_NOT_FOUND, None);
        assert!(response.halt_processing());
    }

    #[test]
    fn test_top_level_interaction_owns_itself() {
        let interaction = Interaction::new(
            Target::new("Widget", 1, Action::Show),
            None,
            RequestSnapshot::default(),
            ErrorDescriptions::platform(),
        );
        assert_eq!(interaction.id, interaction.owning_id);
        assert_eq!(interaction.target.to_string(), "Widget#show v1");
    }
}
