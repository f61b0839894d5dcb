//! The service runtime.
//!
//! A [`ServiceRuntime`] owns everything a service needs to host resource
//! interfaces and to call other resources: the hosted interfaces, the
//! endpoint locator, the session store and augmenter, the optional queue
//! binding, the HTTP client and the local connection pool.
//!
//! Requests reach the runtime in two ways. Inbound HTTP and queue requests
//! go through [`ServiceRuntime::handle_http`], which parses the wire form and
//! resolves the session. Local inter-resource calls go straight to
//! [`ServiceRuntime::dispatch`]. Both run the same checks before the
//! implementation is called:
//!
//! 1. the interface must be hosted (`404 platform.not_found`);
//! 2. the action must be implemented (`405 platform.method_not_allowed`);
//! 3. non-public actions need a session (`401 platform.invalid_session`);
//! 4. the session must permit the action, `ASK` deferring to
//!    [`Resource::verify`](crate::Resource::verify) (`403 platform.forbidden`);
//! 5. secured values (resource UUID, identity assumption) must be
//!    authorised (`403 platform.forbidden`).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use http::{HeaderMap, Method};
use iris_config::{IrisConfig, QueueConfig};
use iris_core::{
    codes, ErrorCollection, ErrorDescriptions, Interaction, InteractionId, IrisError, IrisResult,
    Policy, Reference, RequestSnapshot, Response, Session, SessionId, Target,
};
use iris_registry::{EndpointLocator, RegistryKey, RegistryResult, ServiceRegistry};
use iris_session::{
    load_session, InMemorySessionStore, SessionLookup, SessionPermissionAugmenter, SessionStore,
};
use tracing::Instrument;

use crate::connection::ConnectionPool;
use crate::context::Context;
use crate::deriver::{check_secured_values, ParentContext};
use crate::endpoint::InterResourceEndpoint;
use crate::inbound::InboundRequest;
use crate::interface::Interface;
use crate::normalize::ResultNormalizer;
use crate::render::{render, render_errors, render_fault};
use crate::resource::{self, Verification};
use crate::transport::queue::QueueBinding;
use crate::transport::RawResponse;

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Locale assumed when a request names none.
    pub default_locale: String,
    /// Timeout of remote HTTP calls.
    pub http_timeout: Duration,
    /// Timeout of queue calls.
    pub queue_timeout: Duration,
    /// Local connection permits.
    pub max_local_connections: usize,
    /// Whether requests without a session are refused.
    pub require_session: bool,
}

impl RuntimeSettings {
    /// Reads the settings from configuration.
    #[must_use]
    pub fn from_config(config: &IrisConfig) -> Self {
        Self {
            default_locale: config.inter_resource.default_locale.clone(),
            http_timeout: Duration::from_millis(config.inter_resource.http_timeout_ms),
            queue_timeout: Duration::from_millis(config.inter_resource.queue_timeout_ms),
            max_local_connections: config.inter_resource.max_local_connections,
            require_session: config.sessions_required(),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&IrisConfig::default())
    }
}

/// A request handed to [`ServiceRuntime::dispatch`].
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// What is called.
    pub target: Target,
    /// Id of the interaction this request creates.
    pub interaction_id: InteractionId,
    /// Owning id of the call chain.
    pub owning_id: InteractionId,
    /// The session, already loaded.
    pub session: Option<Arc<Session>>,
    /// The request.
    pub request: RequestSnapshot,
}

struct RuntimeInner {
    interfaces: HashMap<RegistryKey, Arc<Interface>>,
    endpoints: HashMap<(u32, String), RegistryKey>,
    locator: EndpointLocator,
    registry: Option<Arc<dyn ServiceRegistry>>,
    store: Option<Arc<dyn SessionStore>>,
    augmenter: SessionPermissionAugmenter,
    queue: Option<Arc<dyn QueueBinding>>,
    client: reqwest::Client,
    normalizer: ResultNormalizer,
    connections: ConnectionPool,
    settings: RuntimeSettings,
}

/// Hosts resource interfaces and makes inter-resource calls.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ServiceRuntime {
    inner: Arc<RuntimeInner>,
}

/// A non-owning handle to a [`ServiceRuntime`].
#[derive(Clone, Default)]
pub struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    /// The runtime, if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<ServiceRuntime> {
        self.inner.upgrade().map(|inner| ServiceRuntime { inner })
    }
}

impl fmt::Debug for WeakRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRuntime")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

enum ResolvedSession {
    Found(Option<Arc<Session>>),
    Invalid,
}

impl ServiceRuntime {
    /// Starts building a runtime.
    #[must_use]
    pub fn builder() -> ServiceRuntimeBuilder {
        ServiceRuntimeBuilder::new()
    }

    /// A non-owning handle to this runtime.
    #[must_use]
    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Runtime settings.
    #[must_use]
    pub fn settings(&self) -> &RuntimeSettings {
        &self.inner.settings
    }

    /// The endpoint locator.
    #[must_use]
    pub fn locator(&self) -> &EndpointLocator {
        &self.inner.locator
    }

    /// The hosted interface for `resource` at `version`.
    #[must_use]
    pub fn interface(&self, resource: &str, version: u32) -> Option<&Arc<Interface>> {
        self.inner
            .interfaces
            .get(&RegistryKey::new(resource, version))
    }

    /// All hosted interfaces.
    pub fn interfaces(&self) -> impl Iterator<Item = &Arc<Interface>> {
        self.inner.interfaces.values()
    }

    /// The hosted interface serving `/v{version}/{endpoint}`.
    #[must_use]
    pub fn interface_for_endpoint(&self, version: u32, endpoint: &str) -> Option<&Arc<Interface>> {
        self.inner
            .endpoints
            .get(&(version, endpoint.to_string()))
            .and_then(|key| self.inner.interfaces.get(key))
    }

    /// The session store, if one is configured.
    #[must_use]
    pub fn session_store(&self) -> Option<&Arc<dyn SessionStore>> {
        self.inner.store.as_ref()
    }

    pub(crate) fn augmenter(&self) -> &SessionPermissionAugmenter {
        &self.inner.augmenter
    }

    pub(crate) fn queue_binding(&self) -> Option<&Arc<dyn QueueBinding>> {
        self.inner.queue.as_ref()
    }

    pub(crate) fn http_client(&self) -> &reqwest::Client {
        &self.inner.client
    }

    pub(crate) fn normalizer(&self) -> &ResultNormalizer {
        &self.inner.normalizer
    }

    /// The local connection pool.
    #[must_use]
    pub fn connections(&self) -> &ConnectionPool {
        &self.inner.connections
    }

    /// An endpoint for calling `resource` from outside any interaction,
    /// starting a new call chain.
    #[must_use]
    pub fn endpoint(
        &self,
        resource: impl Into<String>,
        version: u32,
        session: Option<Arc<Session>>,
    ) -> InterResourceEndpoint {
        let mut request = RequestSnapshot::default();
        request.locale = self.settings().default_locale.clone();
        let parent = ParentContext::from_request(InteractionId::new(), session, &request);
        InterResourceEndpoint::new(self.clone(), parent, resource, version)
    }

    /// Registers every hosted interface as served under `base_url`.
    ///
    /// Returns the number of interfaces registered, zero without a
    /// registry.
    pub async fn announce(&self, base_url: &str) -> RegistryResult<usize> {
        let Some(registry) = &self.inner.registry else {
            return Ok(0);
        };
        let base_url = base_url.trim_end_matches('/');
        for interface in self.interfaces() {
            let key = RegistryKey::new(interface.resource(), interface.version());
            let uri = format!("{base_url}{}", interface.path());
            registry.add(&key, &uri).await?;
            tracing::info!(key = %key, uri = %uri, "Announced interface");
        }
        Ok(self.inner.interfaces.len())
    }

    /// Runs a request against a hosted interface.
    ///
    /// Expected problems are returned as errors on the response.
    ///
    /// # Errors
    ///
    /// Returns [`IrisError::Implementation`] if the implementation fails.
    pub async fn dispatch(&self, request: DispatchRequest) -> IrisResult<Response> {
        let DispatchRequest {
            target,
            interaction_id,
            owning_id,
            session,
            request,
        } = request;

        let Some(interface) = self.interface(&target.resource, target.version).cloned() else {
            return Ok(rejection(
                ErrorDescriptions::platform(),
                codes::PLATFORM_NOT_FOUND,
                Some(Reference::new().with(
                    "entity_name",
                    format!("v{} of {} interface endpoint", target.version, target.resource),
                )),
            ));
        };
        let descriptions = Arc::clone(interface.descriptions());

        if !interface.implements(target.action) {
            return Ok(rejection(
                descriptions,
                codes::PLATFORM_METHOD_NOT_ALLOWED,
                None,
            ));
        }

        let action = target.action;
        let context = Context::new(
            Interaction::with_ids(
                interaction_id,
                owning_id,
                target,
                session,
                request,
                Arc::clone(&descriptions),
            ),
            self.clone(),
            interface.additional_permissions(action).cloned(),
        );

        if !interface.is_public(action) {
            let Some(session) = context.session() else {
                return Ok(rejection(descriptions, codes::PLATFORM_INVALID_SESSION, None));
            };
            let allowed = match session.permissions.permitted(interface.resource(), action) {
                Policy::Allow => true,
                Policy::Ask => {
                    interface.implementation().verify(&context, action).await == Verification::Allow
                }
                Policy::Deny => false,
            };
            if !allowed {
                tracing::debug!(
                    resource = interface.resource(),
                    action = %action,
                    "Action not permitted by session"
                );
                return Ok(rejection(descriptions, codes::PLATFORM_FORBIDDEN, None));
            }
        }

        if let Err(reason) = check_secured_values(
            context.request().resource_uuid.as_ref(),
            context.request().assume_identity_of.as_ref(),
            action,
            context.session().map(|session| &**session),
        ) {
            tracing::debug!(reason = %reason, "Secured request value refused");
            return Ok(rejection(descriptions, codes::PLATFORM_FORBIDDEN, None));
        }

        let mut context = context;
        resource::run(interface.implementation(), action, &mut context)
            .await
            .map_err(|e| {
                IrisError::implementation(
                    format!("{} failed in {}", action, interface.resource()),
                    e,
                )
            })?;

        Ok(context.into_response())
    }

    /// Handles a request in wire form and renders the reply.
    ///
    /// Used by the HTTP server and by queue consumers.
    pub async fn handle_http(
        &self,
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: &[u8],
    ) -> RawResponse {
        let started = Instant::now();

        let (action, raw) = match InboundRequest::parse(method, path, query, headers, body) {
            Ok(inbound) => {
                let interaction_id = inbound.headers.interaction_id.unwrap_or_default();
                let owning_id = inbound
                    .headers
                    .owning_interaction_id
                    .unwrap_or(interaction_id);
                let span = tracing::info_span!(
                    "inbound",
                    interaction_id = %interaction_id,
                    owning_interaction_id = %owning_id,
                    version = inbound.version,
                    endpoint = %inbound.endpoint,
                    action = %inbound.action,
                );
                let action = inbound.action.as_str();
                let raw = self
                    .serve(inbound, interaction_id, owning_id)
                    .instrument(span)
                    .await;
                (action, raw)
            }
            Err(rejection) => {
                tracing::debug!(path = %path, reason = %rejection, "Rejected malformed request");
                ("none", render_errors(&rejection.to_errors(), &InteractionId::new()))
            }
        };

        iris_telemetry::record_request(action, raw.status, started.elapsed());
        raw
    }

    async fn serve(
        &self,
        inbound: InboundRequest,
        interaction_id: InteractionId,
        owning_id: InteractionId,
    ) -> RawResponse {
        let Some(interface) = self.interface_for_endpoint(inbound.version, &inbound.endpoint) else {
            let mut errors = ErrorCollection::new();
            errors.add_error(
                codes::PLATFORM_NOT_FOUND,
                Some(Reference::new().with(
                    "path",
                    format!("/v{}/{}", inbound.version, inbound.endpoint),
                )),
            );
            return render_errors(&errors, &interaction_id);
        };
        let target = Target::new(interface.resource(), inbound.version, inbound.action);

        let session = match self.resolve_session(inbound.headers.session_id.as_ref()).await {
            Ok(ResolvedSession::Found(session)) => session,
            Ok(ResolvedSession::Invalid) => {
                let mut errors = ErrorCollection::new();
                errors.add_error(codes::PLATFORM_INVALID_SESSION, None);
                return render_errors(&errors, &interaction_id);
            }
            Err(e) => {
                tracing::error!(error = %e, "Session lookup failed");
                return render_fault(&e, &interaction_id);
            }
        };

        let action = inbound.action;
        let deja_vu = inbound.headers.deja_vu;
        let request = inbound.into_snapshot(&self.settings().default_locale);

        let dispatched = self
            .dispatch(DispatchRequest {
                target,
                interaction_id,
                owning_id,
                session,
                request,
            })
            .await;

        match dispatched {
            Ok(response) => {
                let raw = render(&response, &interaction_id, action, deja_vu);
                tracing::debug!(status = raw.status, "Request handled");
                raw
            }
            Err(e) => {
                tracing::error!(error = %e, category = e.category(), "Request failed");
                render_fault(&e, &interaction_id)
            }
        }
    }

    async fn resolve_session(&self, session_id: Option<&SessionId>) -> IrisResult<ResolvedSession> {
        match (self.session_store(), session_id) {
            (Some(store), Some(id)) => match load_session(store.as_ref(), id).await {
                Ok(SessionLookup::Valid(session)) => Ok(ResolvedSession::Found(Some(session))),
                Ok(lookup) => {
                    tracing::debug!(session_id = %id, lookup = ?lookup, "Session refused");
                    Ok(ResolvedSession::Invalid)
                }
                Err(e) => Err(IrisError::internal_with_source("session store failed", e)),
            },
            (_, None) if self.settings().require_session => Ok(ResolvedSession::Found(None)),
            _ => Ok(ResolvedSession::Found(Some(Arc::new(Session::test_session())))),
        }
    }
}

fn rejection(
    descriptions: Arc<ErrorDescriptions>,
    code: &str,
    reference: Option<Reference>,
) -> Response {
    let mut response = Response::new(descriptions);
    response.add_error(code, reference);
    response
}

impl fmt::Debug for ServiceRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hosted: Vec<String> = self
            .inner
            .interfaces
            .keys()
            .map(ToString::to_string)
            .collect();
        hosted.sort();
        f.debug_struct("ServiceRuntime")
            .field("hosted", &hosted)
            .field("registry", &self.inner.registry.is_some())
            .field("session_store", &self.inner.store.is_some())
            .field("queue_binding", &self.inner.queue.is_some())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

/// Builder for [`ServiceRuntime`].
#[derive(Default)]
pub struct ServiceRuntimeBuilder {
    interfaces: Vec<Interface>,
    settings: RuntimeSettings,
    queue: QueueConfig,
    registry: Option<Arc<dyn ServiceRegistry>>,
    store: Option<Arc<dyn SessionStore>>,
    binding: Option<Arc<dyn QueueBinding>>,
}

impl ServiceRuntimeBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hosts an interface.
    #[must_use]
    pub fn interface(mut self, interface: Interface) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Applies settings and queue routes from configuration.
    #[must_use]
    pub fn config(mut self, config: &IrisConfig) -> Self {
        self.settings = RuntimeSettings::from_config(config);
        self.queue = config.queue.clone();
        self
    }

    /// Replaces the settings.
    #[must_use]
    pub fn settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replaces the queue configuration.
    #[must_use]
    pub fn queue_config(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Uses a shared service registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn ServiceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Uses a session store.
    #[must_use]
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses a queue binding for queue-routed calls.
    #[must_use]
    pub fn queue_binding(mut self, binding: Arc<dyn QueueBinding>) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Builds the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`IrisError::Configuration`] if two interfaces share a
    /// resource and version or a path.
    pub fn build(self) -> IrisResult<ServiceRuntime> {
        let mut interfaces = HashMap::new();
        let mut endpoints = HashMap::new();
        let mut locator = EndpointLocator::new().with_queue_config(&self.queue);

        for interface in self.interfaces {
            let key = RegistryKey::new(interface.resource(), interface.version());
            let path = (interface.version(), interface.endpoint().to_string());
            if interfaces.contains_key(&key) {
                return Err(IrisError::configuration(format!("interface {key} hosted twice")));
            }
            if endpoints.contains_key(&path) {
                return Err(IrisError::configuration(format!(
                    "path {} served by two interfaces",
                    interface.path()
                )));
            }
            locator = locator.with_hosted(interface.resource(), interface.version());
            endpoints.insert(path, key.clone());
            interfaces.insert(key, Arc::new(interface));
        }

        if let Some(registry) = &self.registry {
            locator = locator.with_registry(Arc::clone(registry));
        }

        let client = reqwest::Client::builder()
            .timeout(self.settings.http_timeout)
            .build()
            .map_err(|e| IrisError::internal_with_source("failed to build HTTP client", e))?;

        let augmenter_store: Arc<dyn SessionStore> = match &self.store {
            Some(store) => Arc::clone(store),
            None => Arc::new(InMemorySessionStore::new()),
        };

        Ok(ServiceRuntime {
            inner: Arc::new(RuntimeInner {
                interfaces,
                endpoints,
                locator,
                registry: self.registry,
                store: self.store,
                augmenter: SessionPermissionAugmenter::new(augmenter_store),
                queue: self.binding,
                client,
                normalizer: ResultNormalizer::new(),
                connections: ConnectionPool::new(self.settings.max_local_connections),
                settings: self.settings,
            }),
        })
    }
}
