//! In-process transport.
//!
//! Calls a resource hosted by the same runtime without leaving the process.
//! The call is dispatched directly and its response rendered exactly as an
//! HTTP reply would be, so the normalizer cannot tell the two apart.

use iris_core::IrisResult;

use super::{CallRequest, TransportOutcome};
use crate::render::render;
use crate::runtime::{DispatchRequest, ServiceRuntime};

/// Dispatches `request` to a locally hosted interface.
///
/// # Errors
///
/// Returns the error of a failing implementation, or an internal error if
/// the local connection pool has been closed.
pub async fn invoke(runtime: &ServiceRuntime, request: &CallRequest) -> IrisResult<TransportOutcome> {
    let child = &request.context;
    let dispatch = DispatchRequest {
        target: request.target.clone(),
        interaction_id: child.interaction_id,
        owning_id: child.owning_id,
        session: request.session.clone(),
        request: request.to_snapshot(),
    };

    // Resource futures recurse through here; boxing keeps the future sized.
    let response = runtime
        .connections()
        .scope(Box::pin(runtime.dispatch(dispatch)))
        .await??;

    Ok(TransportOutcome::Delivered(render(
        &response,
        &child.interaction_id,
        request.target.action,
        child.deja_vu,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deriver::{derive, CallOverrides, ParentContext};
    use crate::{BoxFuture, Context, Interface, Resource};
    use iris_core::{Action, InteractionId, ListParameters, RequestSnapshot, Session, Target};
    use serde_json::json;
    use std::sync::Arc;

    struct Greeter;

    impl Resource for Greeter {
        fn show<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move {
                let ident = ctx.request().ident.clone().unwrap_or_default();
                let locale = ctx.request().locale.clone();
                ctx.response_mut()
                    .set_resource(json!({"hello": ident, "locale": locale}));
                Ok(())
            })
        }
    }

    fn runtime() -> ServiceRuntime {
        ServiceRuntime::builder()
            .interface(Interface::new("Greeter", 1, "greeters", Greeter))
            .build()
            .unwrap()
    }

    fn call(action: Action, ident: Option<&str>) -> CallRequest {
        let mut snapshot = RequestSnapshot::default();
        snapshot.locale = "de".to_string();
        let parent = ParentContext::from_request(InteractionId::new(), None, &snapshot);
        CallRequest {
            target: Target::new("Greeter", 1, action),
            context: derive(&parent, action, &CallOverrides::default()),
            session: Some(Arc::new(Session::test_session())),
            ident: ident.map(str::to_string),
            body: None,
            list: ListParameters::default(),
        }
    }

    #[tokio::test]
    async fn test_local_show() {
        let runtime = runtime();
        let outcome = invoke(&runtime, &call(Action::Show, Some("world")))
            .await
            .unwrap();

        let TransportOutcome::Delivered(raw) = outcome else {
            panic!("expected a reply");
        };
        assert_eq!(raw.status, 200);
        let body: serde_json::Value = serde_json::from_slice(&raw.body).unwrap();
        assert_eq!(body, json!({"hello": "world", "locale": "de"}));
        assert_eq!(runtime.connections().available(), runtime.connections().size());
    }

    #[tokio::test]
    async fn test_unimplemented_action_is_rendered() {
        let outcome = invoke(&runtime(), &call(Action::Delete, Some("world")))
            .await
            .unwrap();
        let TransportOutcome::Delivered(raw) = outcome else {
            panic!("expected a reply");
        };
        assert_eq!(raw.status, 405);
    }
}
