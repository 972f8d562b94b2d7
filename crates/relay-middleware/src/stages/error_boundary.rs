//! Error boundary unit.
//!
//! Converts any failure from later in the chain into a well-formed `500`
//! response, so nothing escapes to the caller. Register it first so it
//! wraps every other unit.
//!
//! # Error Envelope Format
//!
//! ```json
//! {
//!   "error": {
//!     "code": "INTERNAL_ERROR",
//!     "message": "internal server error",
//!     "request_id": "uuid-v7-request-id"
//!   }
//! }
//! ```
//!
//! `request_id` is present when a request id unit ran before the failure;
//! the id is then also sent in the `x-request-id` header.
//!
//! # Example
//!
//! ```
//! use relay_middleware::stages::ErrorBoundaryUnit;
//!
//! // Development only: puts the error text in the response.
//! let boundary = ErrorBoundaryUnit::new().expose_errors(true);
//! assert!(boundary.exposes_errors());
//! ```

use crate::dispatcher::{with_request_id_header, INTERNAL_ERROR_MESSAGE};
use crate::middleware::{Middleware, Next};
use futures_util::FutureExt;
use http::StatusCode;
use relay_core::{BoxFuture, HandlerError, HandlerResult, RequestContext, ResponseContext};
use std::panic::AssertUnwindSafe;

/// Error code of the envelope.
pub const INTERNAL_ERROR_CODE: &str = "INTERNAL_ERROR";

/// Outermost safety net of a pipeline.
///
/// # Exception safety
///
/// Both `Err` results and panics from downstream are caught. The request
/// context may be partially updated by the failed units; the boundary only
/// reads the request id from it.
///
/// # Cancellation
///
/// Holds nothing across `next`.
#[derive(Debug, Clone)]
pub struct ErrorBoundaryUnit {
    expose_errors: bool,
    message: String,
}

impl Default for ErrorBoundaryUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorBoundaryUnit {
    /// Creates a boundary with the generic message.
    #[must_use]
    pub fn new() -> Self {
        Self {
            expose_errors: false,
            message: INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }

    /// Sets whether the error text replaces the generic message.
    ///
    /// **Warning**: Only enable this in development environments.
    #[must_use]
    pub fn expose_errors(mut self, expose: bool) -> Self {
        self.expose_errors = expose;
        self
    }

    /// Sets the generic message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Returns whether error text is exposed.
    #[must_use]
    pub const fn exposes_errors(&self) -> bool {
        self.expose_errors
    }

    fn convert(&self, ctx: &RequestContext, error: &HandlerError) -> ResponseContext {
        tracing::error!(
            error = %error,
            panicked = error.is_panic(),
            method = %ctx.method(),
            path = ctx.path(),
            request_id = ?ctx.request_id(),
            "request failed"
        );

        let detail;
        let message = if self.expose_errors {
            detail = error.to_string();
            detail.as_str()
        } else {
            self.message.as_str()
        };
        with_request_id_header(
            ResponseContext::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                INTERNAL_ERROR_CODE,
                message,
                ctx.request_id(),
            ),
            ctx,
        )
    }
}

impl Middleware for ErrorBoundaryUnit {
    fn name(&self) -> &'static str {
        "error_boundary"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let outcome = AssertUnwindSafe(next.run(ctx)).catch_unwind().await;
            let error = match outcome {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(error)) => error,
                Err(payload) => HandlerError::from_panic(payload),
            };
            Ok(self.convert(ctx, &error))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::RequestIdUnit;
    use crate::Pipeline;
    use relay_core::{handler_fn, Handler};

    fn pipeline<H: Handler>(unit: ErrorBoundaryUnit, terminal: H) -> Pipeline {
        Pipeline::builder()
            .register(unit)
            .register(RequestIdUnit::new())
            .terminal(terminal)
            .build()
            .unwrap()
    }

    fn panicking() -> impl Handler {
        handler_fn(|ctx| {
            let explode = ctx.path().starts_with('/');
            async move {
                assert!(!explode, "handler bug");
                Ok(ResponseContext::new(StatusCode::OK))
            }
        })
    }

    async fn body_of(response: ResponseContext) -> serde_json::Value {
        serde_json::from_slice(&response.into_bytes().await).unwrap()
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let pipeline = pipeline(
            ErrorBoundaryUnit::new(),
            handler_fn(|_| async { Ok(ResponseContext::text(StatusCode::CREATED, "made")) }),
        );
        let response = pipeline.execute(&mut RequestContext::mock()).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.into_bytes().await, "made");
    }

    #[tokio::test]
    async fn test_error_becomes_generic_500() {
        let pipeline = pipeline(
            ErrorBoundaryUnit::new(),
            handler_fn(|_| async { Err(HandlerError::msg("db password is hunter2")) }),
        );
        let mut ctx = RequestContext::mock();
        let response = pipeline.execute(&mut ctx).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let request_id = ctx.request_id().unwrap().to_string();
        assert_eq!(response.headers().get("x-request-id"), Some(request_id.as_str()));

        let body = body_of(response).await;
        assert_eq!(body["error"]["code"], INTERNAL_ERROR_CODE);
        assert_eq!(body["error"]["message"], INTERNAL_ERROR_MESSAGE);
        assert_eq!(body["error"]["request_id"], request_id);
    }

    #[tokio::test]
    async fn test_panic_becomes_500() {
        let pipeline = pipeline(
            ErrorBoundaryUnit::new(),
            panicking(),
        );
        let response = pipeline.execute(&mut RequestContext::mock()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body_of(response).await.to_string().contains("handler bug"));
    }

    #[tokio::test]
    async fn test_expose_errors() {
        let pipeline = pipeline(
            ErrorBoundaryUnit::new().expose_errors(true),
            panicking(),
        );
        let response = pipeline.execute(&mut RequestContext::mock()).await.unwrap();
        let body = body_of(response).await;
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("handler bug"));
    }

    #[tokio::test]
    async fn test_custom_message() {
        let pipeline = pipeline(
            ErrorBoundaryUnit::new().message("try again later"),
            handler_fn(|_| async { Err(HandlerError::msg("boom")) }),
        );
        let response = pipeline.execute(&mut RequestContext::mock()).await.unwrap();
        assert_eq!(body_of(response).await["error"]["message"], "try again later");
    }

    #[test]
    fn test_name() {
        assert_eq!(ErrorBoundaryUnit::default().name(), "error_boundary");
        assert!(!ErrorBoundaryUnit::default().exposes_errors());
    }
}
