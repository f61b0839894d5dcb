//! The resource implementation trait.
//!
//! A [`Resource`] implements some of the five actions of one interface. Each
//! action receives the [`Context`] of its interaction: it reads the request,
//! writes the response, and may call other resources through
//! [`Context::resource`].
//!
//! Expected problems are recorded as errors on the response. Returning `Err`
//! is reserved for faults; the caller receives a `platform.fault`.
//!
//! # Example
//!
//! ```
//! use iris_middleware::{BoxFuture, Context, Resource};
//! use serde_json::json;
//!
//! struct Echo;
//!
//! impl Resource for Echo {
//!     fn show<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
//!         Box::pin(async move {
//!             let ident = ctx.request().ident.clone().unwrap_or_default();
//!             ctx.response_mut().set_resource(json!({ "ident": ident }));
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

use iris_core::{codes, Action};

use crate::context::Context;

/// A boxed future, used at the object-safe resource seam.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Answer of [`Resource::verify`] for actions the session marks `ASK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Proceed.
    Allow,
    /// Refuse with `platform.forbidden`.
    Deny,
}

/// Implementation of one resource interface.
///
/// Every action defaults to adding `platform.method_not_allowed`.
pub trait Resource: Send + Sync + 'static {
    /// Lists instances.
    fn list<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
        not_allowed(ctx)
    }

    /// Shows one instance.
    fn show<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
        not_allowed(ctx)
    }

    /// Creates an instance.
    fn create<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
        not_allowed(ctx)
    }

    /// Updates an instance.
    fn update<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
        not_allowed(ctx)
    }

    /// Deletes an instance.
    fn delete<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, anyhow::Result<()>> {
        not_allowed(ctx)
    }

    /// Decides an `ASK` permission. Denies unless overridden.
    fn verify<'a>(&'a self, _ctx: &'a Context, _action: Action) -> BoxFuture<'a, Verification> {
        Box::pin(async { Verification::Deny })
    }
}

fn not_allowed(ctx: &mut Context) -> BoxFuture<'_, anyhow::Result<()>> {
    Box::pin(async move {
        ctx.response_mut()
            .add_error(codes::PLATFORM_METHOD_NOT_ALLOWED, None);
        Ok(())
    })
}

/// Runs `action` on `resource`.
pub(crate) fn run<'a>(
    resource: &'a dyn Resource,
    action: Action,
    ctx: &'a mut Context,
) -> BoxFuture<'a, anyhow::Result<()>> {
    match action {
        Action::List => resource.list(ctx),
        Action::Show => resource.show(ctx),
        Action::Create => resource.create(ctx),
        Action::Update => resource.update(ctx),
        Action::Delete => resource.delete(ctx),
    }
}
