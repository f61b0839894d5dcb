//! Session storage.
//!
//! Sessions are written once and read many times; they are never updated
//! in place. A store also knows each caller's current version so that
//! sessions issued before a caller changed can be rejected.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use iris_core::{Session, SessionId};
use parking_lot::RwLock;

use crate::error::{StoreError, StoreResult};

/// A boxed future, used at the object-safe store seam.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Persistent (or transient) home of sessions.
pub trait SessionStore: Send + Sync + fmt::Debug {
    /// Loads a session by id, expired or not.
    fn load<'a>(&'a self, id: &'a SessionId) -> BoxFuture<'a, StoreResult<Option<Session>>>;

    /// Writes a session under its id.
    ///
    /// Fails with [`StoreError::OutdatedCaller`] if the caller's current
    /// version is newer than the session's.
    fn save<'a>(&'a self, session: &'a Session) -> BoxFuture<'a, StoreResult<()>>;

    /// The caller's current version, if the caller is known.
    fn caller_version<'a>(&'a self, caller_id: &'a str) -> BoxFuture<'a, StoreResult<Option<u64>>>;
}

/// Outcome of [`load_session`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionLookup {
    /// Usable session.
    Valid(Arc<Session>),
    /// No session with that id.
    NotFound,
    /// The session has expired.
    Expired,
    /// The session predates the caller's current version.
    Outdated,
}

impl SessionLookup {
    /// The session, if valid.
    #[must_use]
    pub fn valid(self) -> Option<Arc<Session>> {
        match self {
            Self::Valid(session) => Some(session),
            _ => None,
        }
    }
}

/// Loads a session and checks expiry and caller version.
///
/// A caller unknown to the store counts as outdated.
///
/// # Errors
///
/// Propagates store failures.
pub async fn load_session(store: &dyn SessionStore, id: &SessionId) -> StoreResult<SessionLookup> {
    let Some(session) = store.load(id).await? else {
        return Ok(SessionLookup::NotFound);
    };

    if session.is_expired() {
        tracing::debug!(session_id = %id, "Session expired");
        return Ok(SessionLookup::Expired);
    }

    match store.caller_version(&session.caller_id).await? {
        Some(current) if current == session.caller_version => {
            Ok(SessionLookup::Valid(Arc::new(session)))
        }
        current => {
            tracing::debug!(
                session_id = %id,
                caller_id = %session.caller_id,
                session_version = session.caller_version,
                current_version = ?current,
                "Session caller version mismatch"
            );
            Ok(SessionLookup::Outdated)
        }
    }
}

/// Transient in-process session store.
///
/// # Example
///
/// ```
/// use iris_core::Session;
/// use iris_session::{load_session, InMemorySessionStore, SessionLookup, SessionStore};
///
/// # tokio_test::block_on(async {
/// let store = InMemorySessionStore::new();
/// store.register_caller("caller-1", 1);
///
/// let session = Session::new("caller-1", 1, chrono::Duration::minutes(5));
/// store.save(&session).await.unwrap();
///
/// let lookup = load_session(&store, &session.session_id).await.unwrap();
/// assert!(matches!(lookup, SessionLookup::Valid(_)));
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    callers: RwLock<HashMap<String, u64>>,
    writes: AtomicU64,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a caller's current version, replacing any previous one.
    pub fn register_caller(&self, caller_id: impl Into<String>, version: u64) {
        self.callers.write().insert(caller_id.into(), version);
    }

    /// Number of successful `save` calls.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of stored sessions, including expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if no sessions are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Drops expired sessions, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        before - sessions.len()
    }
}

impl SessionStore for InMemorySessionStore {
    fn load<'a>(&'a self, id: &'a SessionId) -> BoxFuture<'a, StoreResult<Option<Session>>> {
        Box::pin(async move { Ok(self.sessions.read().get(id).cloned()) })
    }

    fn save<'a>(&'a self, session: &'a Session) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let current = self.callers.read().get(&session.caller_id).copied();
            if let Some(current) = current {
                if current > session.caller_version {
                    return Err(StoreError::OutdatedCaller {
                        caller_id: session.caller_id.clone(),
                        session: session.caller_version,
                        current,
                    });
                }
            }

            self.sessions
                .write()
                .insert(session.session_id, session.clone());
            self.writes.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    }

    fn caller_version<'a>(&'a self, caller_id: &'a str) -> BoxFuture<'a, StoreResult<Option<u64>>> {
        Box::pin(async move { Ok(self.callers.read().get(caller_id).copied()) })
    }
}

/// Opens the store named by `uri`.
///
/// Only `memory://` stores are built in.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] for any other scheme.
pub fn open_store(uri: &str) -> StoreResult<Arc<dyn SessionStore>> {
    match uri.split_once("://") {
        Some(("memory", _)) => Ok(Arc::new(InMemorySessionStore::new())),
        _ => Err(StoreError::unavailable(format!(
            "unsupported session store: {uri}"
        ))),
    }
}
