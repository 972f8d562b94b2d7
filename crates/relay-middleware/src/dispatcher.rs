//! Entry point between the transport and the pipeline.
//!
//! The [`Dispatcher`] turns a [`RawRequest`] into a [`RequestContext`], runs
//! the pipeline and turns the result back into a [`RawResponse`]. It never
//! returns an error and never lets a panic escape: anything that goes wrong
//! becomes a fallback response.
//!
//! | Situation | Response |
//! |-----------|----------|
//! | request cannot be parsed | `400` JSON envelope with the reason |
//! | pipeline returns `Err` or panics | `500` generic JSON envelope |
//! | response status outside `100..=599` | `500` generic JSON envelope |

use crate::pipeline::Pipeline;
use crate::stages::request_id::REQUEST_ID_HEADER;
use bytes::Bytes;
use futures_util::FutureExt;
use http::StatusCode;
use http_body_util::Full;
use relay_core::{
    HandlerError, RawRequest, RawResponse, RequestContext, ResponseContext, MAX_STATUS,
    MIN_STATUS,
};
use relay_telemetry::metrics::{self, InFlightGuard};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Message used for every `500` the dispatcher produces.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// `method` metric label for requests rejected before their method was parsed.
pub const INVALID_METHOD_LABEL: &str = "INVALID";

/// Where a dispatch currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    /// Waiting for a request.
    Idle,
    /// Validating the raw request.
    ContextBuilding,
    /// Running units and the terminal.
    PipelineExecuting,
    /// Checking and serializing the response.
    Responding,
}

impl DispatchPhase {
    /// Lowercase name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ContextBuilding => "context_building",
            Self::PipelineExecuting => "pipeline_executing",
            Self::Responding => "responding",
        }
    }
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs raw requests through a [`Pipeline`].
///
/// Cloning is cheap; clones share the pipeline.
#[derive(Clone)]
pub struct Dispatcher {
    pipeline: Arc<Pipeline>,
}

impl Dispatcher {
    /// Creates a dispatcher owning `pipeline`.
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Self::from_shared(Arc::new(pipeline))
    }

    /// Creates a dispatcher over a shared pipeline.
    #[must_use]
    pub const fn from_shared(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// Returns the pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Handles one request from start to finish.
    pub async fn handle(&self, raw: RawRequest) -> RawResponse {
        let _in_flight = InFlightGuard::new();
        let start = Instant::now();

        enter(DispatchPhase::ContextBuilding);
        let (method_label, raw_response) = match RequestContext::from_raw(raw) {
            Ok(mut ctx) => {
                enter(DispatchPhase::PipelineExecuting);
                let response = self.run_pipeline(&mut ctx).await;
                enter(DispatchPhase::Responding);
                (ctx.method().as_str(), emit(response, &ctx).await)
            }
            Err(err) => {
                tracing::warn!(error = %err, "rejecting malformed request");
                metrics::record_fallback("malformed_request");
                enter(DispatchPhase::Responding);
                let response = ResponseContext::json_error(
                    StatusCode::BAD_REQUEST,
                    "BAD_REQUEST",
                    &err.to_string(),
                    None,
                )
                .into_raw()
                .await;
                (INVALID_METHOD_LABEL, response)
            }
        };

        metrics::record_request(method_label, raw_response.status, start.elapsed());
        enter(DispatchPhase::Idle);
        raw_response
    }

    /// Handles an `http` crate request.
    pub async fn handle_http(&self, request: http::Request<Full<Bytes>>) -> http::Response<Full<Bytes>> {
        let raw = RawRequest::from_http(request).await;
        self.handle(raw).await.into_http()
    }

    async fn run_pipeline(&self, ctx: &mut RequestContext) -> ResponseContext {
        let outcome = AssertUnwindSafe(self.pipeline.execute(ctx))
            .catch_unwind()
            .await;

        let error = match outcome {
            Ok(Ok(response)) => return response,
            Ok(Err(error)) => {
                metrics::record_fallback("handler_error");
                error
            }
            Err(payload) => {
                metrics::record_fallback("panic");
                HandlerError::from_panic(payload)
            }
        };

        tracing::error!(
            error = %error,
            panicked = error.is_panic(),
            method = %ctx.method(),
            path = ctx.path(),
            request_id = ?ctx.request_id(),
            "pipeline failed without an error boundary"
        );
        internal_error(ctx)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

fn enter(phase: DispatchPhase) {
    tracing::debug!(phase = %phase, "dispatch phase");
}

fn internal_error(ctx: &RequestContext) -> ResponseContext {
    with_request_id_header(
        ResponseContext::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            INTERNAL_ERROR_MESSAGE,
            ctx.request_id(),
        ),
        ctx,
    )
}

/// Echoes the request id, if one was assigned, on a response built outside
/// the request id unit.
pub(crate) fn with_request_id_header(
    mut response: ResponseContext,
    ctx: &RequestContext,
) -> ResponseContext {
    if let Some(id) = ctx.request_id() {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER, id.to_string());
    }
    response
}

/// Checks the status range and materializes the body.
async fn emit(response: ResponseContext, ctx: &RequestContext) -> RawResponse {
    let code = response.status().as_u16();
    let response = if (MIN_STATUS..=MAX_STATUS).contains(&code) {
        response
    } else {
        tracing::error!(status = code, path = ctx.path(), "response status out of range");
        metrics::record_fallback("invalid_status");
        internal_error(ctx)
    };

    match AssertUnwindSafe(response.into_raw()).catch_unwind().await {
        Ok(raw) => raw,
        Err(payload) => {
            let error = HandlerError::from_panic(payload);
            tracing::error!(error = %error, path = ctx.path(), "response body panicked");
            metrics::record_fallback("body_panic");
            internal_error(ctx).into_raw().await
        }
    }
}
