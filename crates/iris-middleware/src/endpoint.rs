//! Inter-resource endpoints.
//!
//! An [`InterResourceEndpoint`] is how resource code calls another resource.
//! It finds where the target lives, derives the child request context,
//! augments the session when the calling action declared extra
//! permissions, sends the call over the right transport and normalizes the
//! reply. The caller always gets a [`CallResult`]; problems the target or
//! the transport reported are errors embedded in the result.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use iris_core::{
    codes, Action, AssumedIdentity, CallResult, ErrorCollection, IrisError, IrisResult,
    ListParameters, Reference, Session, Target,
};
use iris_registry::EndpointLocation;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::deriver::{authorise, derive, CallOverrides, ParentContext};
use crate::runtime::ServiceRuntime;
use crate::transport::{self, CallRequest};

/// A handle for calling one resource at one version.
///
/// Obtained from [`Context::resource`](crate::Context::resource) inside an
/// action, or from [`ServiceRuntime::endpoint`] outside one.
///
/// # Example
///
/// ```no_run
/// use iris_core::ListParameters;
/// use iris_middleware::Context;
///
/// # async fn run(ctx: &mut Context) -> anyhow::Result<()> {
/// let mut widgets = ctx.resource("Widget", 1);
/// widgets.set_locale("fr");
///
/// let result = widgets.list(&ListParameters::default()).await?;
/// if result.has_errors() {
///     ctx.response_mut().errors.merge(result.platform_errors());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InterResourceEndpoint {
    runtime: ServiceRuntime,
    parent: ParentContext,
    resource: String,
    version: u32,
    overrides: CallOverrides,
    location: Option<Option<EndpointLocation>>,
}

impl InterResourceEndpoint {
    pub(crate) fn new(
        runtime: ServiceRuntime,
        parent: ParentContext,
        resource: impl Into<String>,
        version: u32,
    ) -> Self {
        Self {
            runtime,
            parent,
            resource: resource.into(),
            version,
            overrides: CallOverrides::default(),
            location: None,
        }
    }

    /// Target resource name.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Target interface version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Values set explicitly on this endpoint.
    #[must_use]
    pub const fn overrides(&self) -> &CallOverrides {
        &self.overrides
    }

    /// Sets the content locale of subsequent calls.
    pub fn set_locale(&mut self, locale: impl Into<String>) -> &mut Self {
        self.overrides.locale = Some(locale.into());
        self
    }

    /// Sets the historic-read point in time.
    pub fn set_dated_at(&mut self, dated_at: DateTime<Utc>) -> &mut Self {
        self.overrides.dated_at = Some(dated_at);
        self
    }

    /// Sets the backdated-write point in time.
    pub fn set_dated_from(&mut self, dated_from: DateTime<Utc>) -> &mut Self {
        self.overrides.dated_from = Some(dated_from);
        self
    }

    /// Asks the target to confirm duplicate creations instead of failing.
    pub fn set_deja_vu(&mut self, deja_vu: bool) -> &mut Self {
        self.overrides.deja_vu = deja_vu;
        self
    }

    /// Chooses the UUID of an instance to be created.
    pub fn set_resource_uuid(&mut self, uuid: Uuid) -> &mut Self {
        self.overrides.resource_uuid = Some(uuid);
        self
    }

    /// Assumes an identity for subsequent calls.
    pub fn set_assume_identity_of(&mut self, identity: AssumedIdentity) -> &mut Self {
        self.overrides.assume_identity_of = Some(identity);
        self
    }

    /// Where the target lives, looked up once and then reused.
    pub async fn location(&mut self) -> Option<EndpointLocation> {
        if let Some(location) = &self.location {
            return location.clone();
        }
        let location = self
            .runtime
            .locator()
            .locate(&self.resource, self.version)
            .await;
        // A miss is not cached; the target may be registered later.
        if location.is_some() {
            self.location = Some(location.clone());
        }
        location
    }

    /// Lists instances.
    ///
    /// # Errors
    ///
    /// Returns an error only for fatal problems; see [`Self::show`].
    pub async fn list(&mut self, parameters: &ListParameters) -> IrisResult<CallResult> {
        self.call(Action::List, None, None, parameters.clone()).await
    }

    /// Shows the instance identified by `ident`.
    ///
    /// # Errors
    ///
    /// Returns an error only for fatal problems: a queue route with no
    /// queue binding, or a locally hosted implementation failing.
    pub async fn show(&mut self, ident: &str) -> IrisResult<CallResult> {
        self.call(Action::Show, Some(ident), None, ListParameters::default())
            .await
    }

    /// Creates an instance from `body`.
    ///
    /// # Errors
    ///
    /// Returns an error only for fatal problems; see [`Self::show`].
    pub async fn create(&mut self, body: Value) -> IrisResult<CallResult> {
        self.call(Action::Create, None, Some(body), ListParameters::default())
            .await
    }

    /// Updates the instance identified by `ident` from `body`.
    ///
    /// # Errors
    ///
    /// Returns an error only for fatal problems; see [`Self::show`].
    pub async fn update(&mut self, ident: &str, body: Value) -> IrisResult<CallResult> {
        self.call(Action::Update, Some(ident), Some(body), ListParameters::default())
            .await
    }

    /// Deletes the instance identified by `ident`.
    ///
    /// # Errors
    ///
    /// Returns an error only for fatal problems; see [`Self::show`].
    pub async fn delete(&mut self, ident: &str) -> IrisResult<CallResult> {
        self.call(Action::Delete, Some(ident), None, ListParameters::default())
            .await
    }

    async fn call(
        &mut self,
        action: Action,
        ident: Option<&str>,
        body: Option<Value>,
        list: ListParameters,
    ) -> IrisResult<CallResult> {
        let started = Instant::now();
        let target = Target::new(self.resource.as_str(), self.version, action);

        let Some(location) = self.location().await else {
            tracing::debug!(target = %target, "No endpoint found for inter-resource call");
            iris_telemetry::record_inter_resource_call("none", "not_found", started.elapsed());
            return Ok(failed(
                action,
                codes::PLATFORM_NOT_FOUND,
                Some(Reference::new().with(
                    "entity_name",
                    format!("v{} of {} interface endpoint", self.version, self.resource),
                )),
            ));
        };

        let child = derive(&self.parent, action, &self.overrides);

        if let Err(reason) = authorise(&self.overrides, action, self.parent.session.as_deref()) {
            tracing::debug!(target = %target, reason = %reason, "Inter-resource call refused");
            iris_telemetry::record_inter_resource_call(
                location.transport(),
                "forbidden",
                started.elapsed(),
            );
            return Ok(failed(action, codes::PLATFORM_FORBIDDEN, None));
        }

        let session = match self.session_for_call().await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(target = %target, error = %e, "Session augmentation failed");
                iris_telemetry::record_inter_resource_call(
                    location.transport(),
                    "fault",
                    started.elapsed(),
                );
                return Ok(failed(
                    action,
                    codes::PLATFORM_FAULT,
                    Some(Reference::new().with("message", "augmented session persist failed")),
                ));
            }
        };

        let span = tracing::debug_span!(
            "inter_resource_call",
            owning_interaction_id = %child.owning_id,
            interaction_id = %child.interaction_id,
            resource = %self.resource,
            version = self.version,
            action = %action,
            transport = location.transport(),
        );

        let deja_vu = child.deja_vu;
        let request = CallRequest {
            target,
            context: child,
            session,
            ident: ident.map(str::to_string),
            body,
            list,
        };

        let outcome = match transport::invoke(&self.runtime, &location, &request)
            .instrument(span.clone())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                iris_telemetry::record_inter_resource_call(
                    location.transport(),
                    "fatal",
                    started.elapsed(),
                );
                return Err(e);
            }
        };

        let result = self
            .runtime
            .normalizer()
            .normalize(&outcome, &request.target, deja_vu);

        iris_telemetry::record_inter_resource_call(
            location.transport(),
            outcome.label(),
            started.elapsed(),
        );
        span.in_scope(|| {
            tracing::debug!(
                outcome = outcome.label(),
                errors = result.platform_errors().len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Inter-resource call finished"
            );
        });

        Ok(result)
    }

    /// The session the next call runs under, augmented if the calling
    /// action declared extra permissions.
    async fn session_for_call(&self) -> IrisResult<Option<Arc<Session>>> {
        let Some(session) = &self.parent.session else {
            return Ok(None);
        };
        self.runtime
            .augmenter()
            .augment(session, self.parent.additional_permissions.as_ref())
            .await
            .map(Some)
            .map_err(|e| IrisError::internal_with_source("augmented session persist failed", e))
    }
}

fn failed(action: Action, code: &str, reference: Option<Reference>) -> CallResult {
    let mut errors = ErrorCollection::new();
    errors.add_error(code, reference);
    CallResult::empty_for(action, errors)
}
