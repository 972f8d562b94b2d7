//! Ordered middleware pipeline.
//!
//! A [`Pipeline`] is an immutable list of units plus a terminal handler,
//! fixed when it is built. The first unit registered is the outermost: its
//! pre-processing runs first and its post-processing runs last.
//!
//! ```text
//! register(A) register(B) register(C) terminal(T)
//!
//! A.before → B.before → C.before → T
//!                                  ↓
//! A.after  ← B.after  ← C.after  ←─┘
//! ```

use crate::middleware::{Middleware, Next};
use relay_core::{
    BoxedHandler, Handler, HandlerResult, InvalidPipelineError, RequestContext,
};
use std::fmt;
use std::sync::Arc;

/// A type-erased, shareable middleware unit.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An immutable chain of units ending in a terminal handler.
///
/// # Example
///
/// ```
/// use http::StatusCode;
/// use relay_core::{handler_fn, RequestContext, ResponseContext};
/// use relay_middleware::{stages::RequestIdUnit, Pipeline};
///
/// # tokio_test::block_on(async {
/// let pipeline = Pipeline::builder()
///     .register(RequestIdUnit::new())
///     .terminal(handler_fn(|_| async { Ok(ResponseContext::text(StatusCode::OK, "ok")) }))
///     .build()
///     .unwrap();
///
/// let mut ctx = RequestContext::mock();
/// let response = pipeline.execute(&mut ctx).await.unwrap();
/// assert_eq!(response.status(), StatusCode::OK);
/// assert!(response.header("x-request-id").is_some());
/// # });
/// ```
pub struct Pipeline {
    stages: Box<[BoxedMiddleware]>,
    terminal: BoxedHandler,
}

impl Pipeline {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Assembles a pipeline from an ordered unit list and a terminal.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPipelineError::MissingTerminal`] if `terminal` is `None`.
    pub fn build(
        units: Vec<BoxedMiddleware>,
        terminal: Option<BoxedHandler>,
    ) -> Result<Self, InvalidPipelineError> {
        let terminal = terminal.ok_or(InvalidPipelineError::MissingTerminal)?;
        Ok(Self {
            stages: units.into_boxed_slice(),
            terminal,
        })
    }

    /// Runs a request through every unit and the terminal.
    ///
    /// Errors and panics are not intercepted here; register an
    /// [`ErrorBoundaryUnit`](crate::stages::ErrorBoundaryUnit) or go through
    /// the [`Dispatcher`](crate::Dispatcher).
    pub async fn execute(&self, ctx: &mut RequestContext) -> HandlerResult {
        Next::new(&self.stages, self.terminal.as_ref()).run(ctx).await
    }

    /// Unit names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Number of units, not counting the terminal.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Pipeline`].
///
/// Units run in registration order. Registering the same instance twice is
/// allowed; it then runs twice.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<BoxedMiddleware>,
    terminal: Option<BoxedHandler>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a unit.
    #[must_use]
    pub fn register<M: Middleware>(self, unit: M) -> Self {
        self.register_shared(Arc::new(unit))
    }

    /// Appends an already-shared unit.
    #[must_use]
    pub fn register_shared(mut self, unit: BoxedMiddleware) -> Self {
        tracing::trace!(unit = unit.name(), position = self.stages.len(), "registering unit");
        self.stages.push(unit);
        self
    }

    /// Appends a unit only when `unit` is `Some`.
    #[must_use]
    pub fn register_optional<M: Middleware>(self, unit: Option<M>) -> Self {
        match unit {
            Some(unit) => self.register(unit),
            None => self,
        }
    }

    /// Sets the terminal handler, replacing any previous one.
    #[must_use]
    pub fn terminal<H: Handler>(self, handler: H) -> Self {
        self.terminal_shared(Arc::new(handler))
    }

    /// Sets an already-shared terminal handler.
    #[must_use]
    pub fn terminal_shared(mut self, handler: BoxedHandler) -> Self {
        self.terminal = Some(handler);
        self
    }

    /// Number of units registered so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPipelineError::MissingTerminal`] if no terminal was set.
    pub fn build(self) -> Result<Pipeline, InvalidPipelineError> {
        let pipeline = Pipeline::build(self.stages, self.terminal)?;
        tracing::debug!(stages = ?pipeline.stage_names(), "pipeline built");
        Ok(pipeline)
    }
}
