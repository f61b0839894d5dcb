//! Sessions.
//!
//! A [`Session`] carries the caller's identity and authorisation for the
//! duration of a request. Sessions live in a transient store keyed by
//! [`SessionId`] and are treated as read-only while a request runs; the only
//! exception is augmentation, which writes a *new* session under a fresh id.

use crate::permissions::{Permissions, Policy};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Headers whose use must be authorised by session scoping.
pub const SECURED_HEADERS: [&str; 2] = ["X-Resource-UUID", "X-Assume-Identity-Of"];

/// Unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a fresh, time-ordered session id.
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

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Data-access scoping attached to a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scoping {
    /// Secured headers the caller may send.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorised_http_headers: Vec<String>,
    /// Identity assumption rules, see [`AssumedIdentity`](crate::AssumedIdentity).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub authorised_identities: Map<String, Value>,
    /// Any other scoping data (for example `account_ids`).
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Scoping {
    /// Returns `true` if the caller may send the named secured header.
    #[must_use]
    pub fn authorises_header(&self, name: &str) -> bool {
        self.authorised_http_headers
            .iter()
            .any(|header| header.eq_ignore_ascii_case(name))
    }
}

/// A caller's session.
///
/// # Example
///
/// ```
/// use iris_core::{Action, Permissions, Policy, Session};
///
/// let session = Session::new("caller-1", 3, chrono::Duration::hours(1))
///     .with_permissions(Permissions::new().with_resource("Widget", Action::Show, Policy::Allow));
///
/// assert!(!session.is_expired());
/// assert_eq!(session.permissions.permitted("Widget", Action::Show), Policy::Allow);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Lookup key in the session store.
    pub session_id: SessionId,
    /// The caller this session belongs to.
    pub caller_id: String,
    /// Caller version at login; compared against the stored caller.
    pub caller_version: u64,
    /// Optional caller fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_fingerprint: Option<String>,
    /// Identity fields.
    #[serde(default)]
    pub identity: Map<String, Value>,
    /// Permission table.
    #[serde(default)]
    pub permissions: Permissions,
    /// Data-access scoping.
    #[serde(default)]
    pub scoping: Scoping,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session with no permissions that expires after `ttl`.
    #[must_use]
    pub fn new(caller_id: impl Into<String>, caller_version: u64, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            session_id: SessionId::new(),
            caller_id: caller_id.into(),
            caller_version,
            caller_fingerprint: None,
            identity: Map::new(),
            permissions: Permissions::new(),
            scoping: Scoping::default(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// A permissive session used when no session store is in play.
    ///
    /// Allows every action and every secured header but no identity
    /// assumption rules.
    #[must_use]
    pub fn test_session() -> Self {
        let mut permissions = Permissions::new();
        permissions.set_default_fallback(Policy::Allow);
        Self::new("test-caller", 1, Duration::days(1))
            .with_permissions(permissions)
            .with_scoping(Scoping {
                authorised_http_headers: SECURED_HEADERS.iter().map(ToString::to_string).collect(),
                ..Scoping::default()
            })
    }

    /// Sets the permission table.
    #[must_use]
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Sets the scoping.
    #[must_use]
    pub fn with_scoping(mut self, scoping: Scoping) -> Self {
        self.scoping = scoping;
        self
    }

    /// Adds an identity field.
    #[must_use]
    pub fn with_identity(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.identity.insert(field.into(), value.into());
        self
    }

    /// Sets the caller fingerprint.
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.caller_fingerprint = Some(fingerprint.into());
        self
    }

    /// Returns `true` if the session has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Copies this session under a fresh id, keeping its expiry.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            session_id: SessionId::new(),
            created_at: Utc::now(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Action;

    #[test]
    fn test_duplicate_gets_fresh_id_same_expiry() {
        let session = Session::new("c", 1, Duration::minutes(5));
        let copy = session.duplicate();
        assert_ne!(copy.session_id, session.session_id);
        assert_eq!(copy.expires_at, session.expires_at);
        assert_eq!(copy.caller_id, session.caller_id);
    }

    #[test]
    fn test_expiry() {
        let session = Session::new("c", 1, Duration::minutes(5));
        assert!(!session.is_expired());
        assert!(session.is_expired_at(session.expires_at));
        assert!(session.is_expired_at(session.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_scoping_header_check_is_case_insensitive() {
        let scoping = Scoping {
            authorised_http_headers: vec!["X-Resource-UUID".into()],
            ..Scoping::default()
        };
        assert!(scoping.authorises_header("x-resource-uuid"));
        assert!(!scoping.authorises_header("X-Assume-Identity-Of"));
    }

    #[test]
    fn test_test_session_is_permissive() {
        let session = Session::test_session();
        assert_eq!(session.permissions.permitted("Any", Action::Delete), Policy::Allow);
        assert!(session.scoping.authorises_header("X-Resource-UUID"));
        assert!(session.scoping.authorised_identities.is_empty());
    }

    #[test]
    fn test_serde_keeps_extra_scoping() {
        let session = Session::new("c", 2, Duration::minutes(1)).with_scoping(Scoping {
            other: serde_json::json!({"account_ids": ["a1"]})
                .as_object()
                .cloned()
                .unwrap(),
            ..Scoping::default()
        });
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["scoping"]["account_ids"][0], "a1");

        let back: Session = serde_json::from_value(json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_session_id_parse() {
        let id = SessionId::new();
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
        assert!("nope".parse::<SessionId>().is_err());
    }
}
