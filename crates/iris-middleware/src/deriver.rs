//! Call context derivation.
//!
//! Each inter-resource call builds its request context from the interaction
//! that makes it plus whatever the caller set explicitly on the endpoint:
//!
//! | Field               | Inherited                  | Explicit value      |
//! |---------------------|----------------------------|---------------------|
//! | locale              | always                     | wins                |
//! | dated-at            | for non-create actions     | wins                |
//! | dated-from          | for create only            | wins                |
//! | deja-vu             | never                      | only source         |
//! | resource UUID       | never                      | only source         |
//! | identity assumption | yes                        | wins, authorised    |
//! | owning interaction  | always                     | n/a                 |
//!
//! Every hop gets a fresh interaction id.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use iris_core::{
    Action, AssumedIdentity, IdentityRejection, InteractionId, Permissions, RequestSnapshot,
    Session,
};
use thiserror::Error;
use uuid::Uuid;

use crate::headers::{X_ASSUME_IDENTITY_OF, X_RESOURCE_UUID};

/// What an endpoint inherits from the interaction that created it.
#[derive(Debug, Clone)]
pub struct ParentContext {
    /// Owning interaction id of the chain.
    pub owning_id: InteractionId,
    /// The session the parent runs under.
    pub session: Option<Arc<Session>>,
    /// Extra permissions the parent's action declares for its calls.
    pub additional_permissions: Option<Permissions>,
    /// Parent locale.
    pub locale: String,
    /// Parent historic-read point in time.
    pub dated_at: Option<DateTime<Utc>>,
    /// Parent backdated-write point in time.
    pub dated_from: Option<DateTime<Utc>>,
    /// Identity the parent assumed.
    pub assume_identity_of: Option<AssumedIdentity>,
}

impl ParentContext {
    /// Captures the inheritable parts of a parent request.
    #[must_use]
    pub fn from_request(
        owning_id: InteractionId,
        session: Option<Arc<Session>>,
        request: &RequestSnapshot,
    ) -> Self {
        Self {
            owning_id,
            session,
            additional_permissions: None,
            locale: request.locale.clone(),
            dated_at: request.dated_at,
            dated_from: request.dated_from,
            assume_identity_of: request.assume_identity_of.clone(),
        }
    }

    /// Sets the extra permissions declared for calls made by the parent.
    #[must_use]
    pub fn with_additional_permissions(mut self, permissions: Option<Permissions>) -> Self {
        self.additional_permissions = permissions;
        self
    }
}

/// Values set explicitly on an endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOverrides {
    /// Content locale.
    pub locale: Option<String>,
    /// Historic-read point in time.
    pub dated_at: Option<DateTime<Utc>>,
    /// Backdated-write point in time.
    pub dated_from: Option<DateTime<Utc>>,
    /// Deja-vu flag.
    pub deja_vu: bool,
    /// Caller-chosen UUID for a created instance.
    pub resource_uuid: Option<Uuid>,
    /// Identity to assume.
    pub assume_identity_of: Option<AssumedIdentity>,
}

/// The request context of one inter-resource call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildRequestContext {
    /// Fresh id of the child interaction.
    pub interaction_id: InteractionId,
    /// Owning id shared with the parent.
    pub owning_id: InteractionId,
    /// Action being called.
    pub action: Action,
    /// Content locale.
    pub locale: String,
    /// Historic-read point in time.
    pub dated_at: Option<DateTime<Utc>>,
    /// Backdated-write point in time.
    pub dated_from: Option<DateTime<Utc>>,
    /// Deja-vu flag.
    pub deja_vu: bool,
    /// Caller-chosen UUID for a created instance.
    pub resource_uuid: Option<Uuid>,
    /// Identity assumed for the call.
    pub assume_identity_of: Option<AssumedIdentity>,
}

/// Builds the request context for calling `action`.
#[must_use]
pub fn derive(parent: &ParentContext, action: Action, overrides: &CallOverrides) -> ChildRequestContext {
    let inherited_dated_at = if action.is_create() {
        None
    } else {
        parent.dated_at
    };
    let inherited_dated_from = if action.is_create() {
        parent.dated_from
    } else {
        None
    };

    ChildRequestContext {
        interaction_id: InteractionId::new(),
        owning_id: parent.owning_id,
        action,
        locale: overrides
            .locale
            .clone()
            .unwrap_or_else(|| parent.locale.clone()),
        dated_at: overrides.dated_at.or(inherited_dated_at),
        dated_from: overrides.dated_from.or(inherited_dated_from),
        deja_vu: overrides.deja_vu,
        resource_uuid: overrides.resource_uuid,
        assume_identity_of: overrides
            .assume_identity_of
            .clone()
            .or_else(|| parent.assume_identity_of.clone()),
    }
}

/// Why a secured value was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unauthorised {
    /// A resource UUID was given for an action other than create.
    #[error("resource UUID given for {action}")]
    ResourceUuidOnNonCreate {
        /// The action attempted.
        action: Action,
    },

    /// The session does not authorise a secured header.
    #[error("secured header '{header}' not authorised")]
    HeaderNotAuthorised {
        /// The header.
        header: &'static str,
    },

    /// The assumed identity breaks the session's rules.
    #[error(transparent)]
    Identity(#[from] IdentityRejection),

    /// A secured value was given without a session.
    #[error("secured value given without a session")]
    NoSession,
}

/// Checks the explicitly set secured values of a call against `session`.
///
/// Inherited identity assumptions were authorised when the parent request
/// was accepted and are not checked again.
pub fn authorise(
    overrides: &CallOverrides,
    action: Action,
    session: Option<&Session>,
) -> Result<(), Unauthorised> {
    check_secured_values(
        overrides.resource_uuid.as_ref(),
        overrides.assume_identity_of.as_ref(),
        action,
        session,
    )
}

/// Checks a resource UUID and an identity assumption against `session`.
///
/// Shared by outbound calls and by the callee when it accepts a request.
pub fn check_secured_values(
    resource_uuid: Option<&Uuid>,
    assume_identity_of: Option<&AssumedIdentity>,
    action: Action,
    session: Option<&Session>,
) -> Result<(), Unauthorised> {
    if resource_uuid.is_none() && assume_identity_of.is_none() {
        return Ok(());
    }
    let session = session.ok_or(Unauthorised::NoSession)?;

    if resource_uuid.is_some() {
        if !action.is_create() {
            return Err(Unauthorised::ResourceUuidOnNonCreate { action });
        }
        if !session.scoping.authorises_header(X_RESOURCE_UUID.as_str()) {
            return Err(Unauthorised::HeaderNotAuthorised {
                header: "X-Resource-UUID",
            });
        }
    }

    if let Some(identity) = assume_identity_of {
        if !session
            .scoping
            .authorises_header(X_ASSUME_IDENTITY_OF.as_str())
        {
            return Err(Unauthorised::HeaderNotAuthorised {
                header: "X-Assume-Identity-Of",
            });
        }
        identity.validate_against(&session.scoping.authorised_identities)?;
    }

    Ok(())
}
