//! # Iris Core
//!
//! Core types for the Iris inter-resource call layer.
//!
//! This crate provides the vocabulary shared by every other Iris crate:
//!
//! - [`Action`] - The five resource actions and their HTTP mapping
//! - [`ErrorCollection`] / [`ErrorDescriptions`] - Expected errors as data
//! - [`IrisError`] - Fatal errors (configuration, implementation faults)
//! - [`Interaction`] - Per-call context: ids, request snapshot, response
//! - [`Session`] / [`Permissions`] - Caller authorisation
//! - [`AssumedIdentity`] - Identity assumption and its rule checks
//! - [`CallResult`] - Uniform result of an inter-resource call
//! - [`ShutdownSignal`] - Graceful shutdown coordination

#![doc(html_root_url = "https://docs.rs/iris-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod action;
mod collection;
pub mod descriptions;
mod error;
mod identity;
mod interaction;
mod permissions;
mod result;
mod session;
mod shutdown;

pub use action::{Action, UnknownAction};
pub use collection::{ErrorCollection, PlatformError, Reference, ERRORS_KIND};
pub use descriptions::{codes, ErrorDescription, ErrorDescriptions};
pub use error::{IrisError, IrisResult};
pub use identity::{AssumedIdentity, IdentityRejection};
pub use interaction::{
    Interaction, InteractionId, ListParameters, MalformedQuery, RequestSnapshot, Response,
    ResponseBody, Target, DEFAULT_LIMIT, DEFAULT_LOCALE,
};
pub use permissions::{Permissions, Policy, ResourcePermissions};
pub use result::{CallResult, CollectionResult, ResourceResult};
pub use session::{Scoping, Session, SessionId, SECURED_HEADERS};
pub use shutdown::ShutdownSignal;
