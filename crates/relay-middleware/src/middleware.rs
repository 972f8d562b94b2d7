//! Core middleware trait and the [`Next`] continuation.
//!
//! A unit does its pre-processing, hands the request on with
//! [`Next::run`], and does its post-processing on the result:
//!
//! ```
//! use relay_core::{BoxFuture, HandlerResult, RequestContext};
//! use relay_middleware::{Middleware, Next};
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut RequestContext,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, HandlerResult> {
//!         Box::pin(async move {
//!             let start = std::time::Instant::now();
//!             let result = next.run(ctx).await;
//!             tracing::debug!(elapsed = ?start.elapsed(), "timed");
//!             result
//!         })
//!     }
//! }
//! ```
//!
//! Returning without calling `next` short-circuits: later units and the
//! terminal handler never run, while earlier units still see the response on
//! their way out.

use crate::pipeline::BoxedMiddleware;
use relay_core::{BoxFuture, Handler, HandlerResult, RequestContext};
use std::fmt;

/// A pipeline stage with pre- and post-processing around the rest of the chain.
///
/// # Invariants
///
/// - `next` is consumed by [`Next::run`], so a unit can call it at most once.
/// - An `Err` returned by `next` should be propagated unchanged unless the
///   unit is a boundary that turns errors into responses.
/// - Anything that must happen whether or not the chain completes belongs in
///   a guard held across the `next` call, since the future may be dropped.
pub trait Middleware: Send + Sync + 'static {
    /// Name used in logs, metrics and pipeline introspection.
    fn name(&self) -> &'static str;

    /// Processes the request, usually by calling `next` exactly once.
    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult>;
}

/// The remainder of the chain after the current unit.
///
/// `Next` borrows the pipeline's unit slice and terminal; it walks the slice
/// by position, so running a request allocates nothing for the chain itself.
pub struct Next<'a> {
    stages: &'a [BoxedMiddleware],
    terminal: &'a dyn Handler,
}

impl<'a> Next<'a> {
    /// Creates a continuation over `stages` ending in `terminal`.
    pub(crate) fn new(stages: &'a [BoxedMiddleware], terminal: &'a dyn Handler) -> Self {
        Self { stages, terminal }
    }

    /// Invokes the next unit, or the terminal handler if none remain.
    ///
    /// Consumes `self`, so it can only be called once.
    pub async fn run(self, ctx: &mut RequestContext) -> HandlerResult {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    terminal: self.terminal,
                };
                stage.process(ctx, next).await
            }
            None => self.terminal.call(ctx).await,
        }
    }

    /// Number of units still to run before the terminal handler.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.stages.iter().map(|s| s.name()).collect();
        f.debug_struct("Next").field("stages", &names).finish_non_exhaustive()
    }
}

/// A unit built from a function.
///
/// Created with [`from_fn`].
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut RequestContext, Next<'a>) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        (self.func)(ctx, next)
    }
}

/// Builds a unit from a closure.
///
/// ```
/// use relay_middleware::from_fn;
///
/// let tag = from_fn("tag", |ctx, next| {
///     Box::pin(async move {
///         ctx.state_mut().insert("tagged", true);
///         let response = next.run(ctx).await?;
///         Ok(response.with_header("x-tagged", "1"))
///     })
/// });
/// # let _ = tag;
/// ```
pub fn from_fn<F>(name: &'static str, func: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut RequestContext, Next<'a>) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    FnMiddleware { name, func }
}
