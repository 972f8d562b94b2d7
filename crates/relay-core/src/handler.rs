//! Terminal handler trait.
//!
//! The [`Handler`] sits at the end of every pipeline. It sees the request
//! context after all units have run their pre-processing, and its response
//! travels back out through the units in reverse order.

use crate::context::RequestContext;
use crate::error::HandlerResult;
use crate::response::ResponseContext;
use http::StatusCode;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A shared, type-erased handler.
pub type BoxedHandler = Arc<dyn Handler>;

/// The innermost step of a pipeline.
///
/// # Example
///
/// ```
/// use http::StatusCode;
/// use relay_core::{BoxFuture, Handler, HandlerResult, RequestContext, ResponseContext};
///
/// struct Hello;
///
/// impl Handler for Hello {
///     fn call<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, HandlerResult> {
///         Box::pin(async move {
///             Ok(ResponseContext::text(StatusCode::OK, format!("hello from {}", ctx.path())))
///         })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Produces the response for a request.
    fn call<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, HandlerResult>;
}

/// A handler backed by a function returning a future.
pub struct FnHandler<F> {
    func: F,
}

impl<F> FnHandler<F> {
    /// Wraps `func`.
    #[must_use]
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(&RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, HandlerResult> {
        Box::pin((self.func)(ctx))
    }
}

/// Adapts a function into a [`Handler`].
///
/// The returned future must not borrow the context; copy out what it needs
/// before the `async` block.
///
/// ```
/// use http::StatusCode;
/// use relay_core::{handler_fn, ResponseContext};
///
/// let handler = handler_fn(|ctx| {
///     let path = ctx.path().to_string();
///     async move { Ok(ResponseContext::text(StatusCode::OK, path)) }
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(func: F) -> FnHandler<F>
where
    F: Fn(&RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler::new(func)
}

/// A terminal that answers every request with `404 Not Found`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFound;

impl Handler for NotFound {
    fn call<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            Ok(ResponseContext::json_error(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("no handler for {} {}", ctx.method(), ctx.path()),
                ctx.request_id(),
            ))
        })
    }
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn call<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, HandlerResult> {
        (**self).call(ctx)
    }
}
