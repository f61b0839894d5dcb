//! Per-interaction context handed to resource implementations.

use std::sync::Arc;

use iris_core::{Interaction, InteractionId, Permissions, RequestSnapshot, Response, Session, Target};
use serde_json::{Map, Value};

use crate::deriver::ParentContext;
use crate::endpoint::InterResourceEndpoint;
use crate::runtime::ServiceRuntime;

/// The context of one interaction, as seen by a [`Resource`](crate::Resource).
///
/// Gives access to the request, the response being built, the session, and
/// endpoints for calling other resources.
#[derive(Debug)]
pub struct Context {
    interaction: Interaction,
    runtime: ServiceRuntime,
    additional_permissions: Option<Permissions>,
}

impl Context {
    pub(crate) fn new(
        interaction: Interaction,
        runtime: ServiceRuntime,
        additional_permissions: Option<Permissions>,
    ) -> Self {
        Self {
            interaction,
            runtime,
            additional_permissions,
        }
    }

    /// The interaction.
    #[must_use]
    pub const fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    /// This interaction's id.
    #[must_use]
    pub const fn interaction_id(&self) -> InteractionId {
        self.interaction.id
    }

    /// Id of the interaction that started the call chain.
    #[must_use]
    pub const fn owning_interaction_id(&self) -> InteractionId {
        self.interaction.owning_id
    }

    /// Resource, version and action being handled.
    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.interaction.target
    }

    /// The request.
    #[must_use]
    pub const fn request(&self) -> &RequestSnapshot {
        &self.interaction.request
    }

    /// The session, absent only for public actions.
    #[must_use]
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.interaction.session.as_ref()
    }

    /// The session's identity with any assumed identity applied.
    #[must_use]
    pub fn identity(&self) -> Map<String, Value> {
        let mut identity = self
            .session()
            .map(|session| session.identity.clone())
            .unwrap_or_default();
        if let Some(assumed) = &self.interaction.request.assume_identity_of {
            assumed.apply_to(&mut identity);
        }
        identity
    }

    /// The response built so far.
    #[must_use]
    pub const fn response(&self) -> &Response {
        &self.interaction.response
    }

    /// Mutable access to the response.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.interaction.response
    }

    /// An endpoint for calling `resource` at `version` on behalf of this
    /// interaction.
    #[must_use]
    pub fn resource(&self, resource: impl Into<String>, version: u32) -> InterResourceEndpoint {
        let parent = ParentContext::from_request(
            self.interaction.owning_id,
            self.interaction.session.clone(),
            &self.interaction.request,
        )
        .with_additional_permissions(self.additional_permissions.clone());
        InterResourceEndpoint::new(self.runtime.clone(), parent, resource, version)
    }

    pub(crate) fn into_response(self) -> Response {
        self.interaction.response
    }
}
