//! Resource actions.
//!
//! Every resource interface exposes some subset of five actions. The action
//! determines the HTTP verb used on the wire, whether a request carries an
//! identifier, and the natural shape of the result (collection vs. single
//! resource).

use http::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// An action that can be performed against a resource endpoint.
///
/// # Example
///
/// ```
/// use iris_core::Action;
///
/// assert_eq!(Action::Update.http_method(), http::Method::PATCH);
/// assert!(Action::List.returns_collection());
/// assert_eq!("show".parse::<Action>().unwrap(), Action::Show);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// List a collection of resource instances.
    List,
    /// Show one resource instance by identifier.
    Show,
    /// Create a new resource instance.
    Create,
    /// Update an existing resource instance.
    Update,
    /// Delete a resource instance.
    Delete,
}

impl Action {
    /// All actions, in canonical order.
    pub const ALL: [Self; 5] = [
        Self::List,
        Self::Show,
        Self::Create,
        Self::Update,
        Self::Delete,
    ];

    /// Returns the snake_case name of this action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Show => "show",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Returns `true` for the create-like action.
    #[must_use]
    pub const fn is_create(&self) -> bool {
        matches!(self, Self::Create)
    }

    /// Returns `true` if the action's natural result is a collection.
    #[must_use]
    pub const fn returns_collection(&self) -> bool {
        matches!(self, Self::List)
    }

    /// Returns `true` if the action addresses one instance by identifier.
    #[must_use]
    pub const fn takes_ident(&self) -> bool {
        matches!(self, Self::Show | Self::Update | Self::Delete)
    }

    /// Returns `true` if the action sends a JSON body.
    #[must_use]
    pub const fn takes_body(&self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }

    /// Returns the HTTP method used for this action on the wire.
    #[must_use]
    pub fn http_method(&self) -> Method {
        match self {
            Self::List | Self::Show => Method::GET,
            Self::Create => Method::POST,
            Self::Update => Method::PATCH,
            Self::Delete => Method::DELETE,
        }
    }

    /// Maps an HTTP method plus identifier presence back to an action.
    ///
    /// Returns `None` for combinations that address no action, such as a
    /// `POST` with an identifier.
    #[must_use]
    pub fn from_http(method: &Method, has_ident: bool) -> Option<Self> {
        match (method, has_ident) {
            (&Method::GET, false) => Some(Self::List),
            (&Method::GET, true) => Some(Self::Show),
            (&Method::POST, false) => Some(Self::Create),
            (&Method::PATCH, true) => Some(Self::Update),
            (&Method::DELETE, true) => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown action name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}
