//! # Iris Session
//!
//! Session storage and permission augmentation.
//!
//! - [`SessionStore`] - the store seam, with [`InMemorySessionStore`]
//! - [`load_session`] - load by id with expiry and caller-version checks
//! - [`SessionPermissionAugmenter`] - derive a temporarily more permissive
//!   session for one inter-resource call
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use iris_core::{Action, Permissions, Policy, Session};
//! use iris_session::{InMemorySessionStore, SessionPermissionAugmenter};
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(InMemorySessionStore::new());
//! let augmenter = SessionPermissionAugmenter::new(store.clone());
//!
//! let session = Arc::new(Session::new("caller-1", 1, chrono::Duration::minutes(5)));
//! let extra = Permissions::new().with_resource("Gadget", Action::List, Policy::Allow);
//!
//! let augmented = augmenter.augment(&session, Some(&extra)).await.unwrap();
//! assert_ne!(augmented.session_id, session.session_id);
//! assert_eq!(store.writes(), 1);
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/iris-session/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod augment;
mod error;
mod store;

pub use augment::SessionPermissionAugmenter;
pub use error::{AugmentationError, StoreError, StoreResult};
pub use store::{
    load_session, open_store, BoxFuture, InMemorySessionStore, SessionLookup, SessionStore,
};
