//! Request deadline.
//!
//! Races the rest of the chain against a timer. On expiry the downstream
//! future is dropped, so every unit suspended inside it unwinds through its
//! guards, and the client gets `504 Gateway Timeout`.

use crate::middleware::{Middleware, Next};
use http::StatusCode;
use relay_core::{BoxFuture, HandlerResult, RequestContext, ResponseContext};
use relay_telemetry::metrics;
use std::time::Duration;

/// Fails requests that take longer than a fixed duration.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutUnit {
    timeout: Duration,
}

impl TimeoutUnit {
    /// Creates a unit with the given deadline.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Creates a unit with a deadline in milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// The deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Middleware for TimeoutUnit {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            if let Ok(result) = tokio::time::timeout(self.timeout, next.run(ctx)).await {
                return result;
            }

            let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(
                timeout_ms,
                method = %ctx.method(),
                path = ctx.path(),
                request_id = ?ctx.request_id(),
                "request timed out"
            );
            metrics::record_short_circuit(self.name(), 504);
            Ok(ResponseContext::json_error(
                StatusCode::GATEWAY_TIMEOUT,
                "GATEWAY_TIMEOUT",
                "request timed out",
                ctx.request_id(),
            ))
        })
    }
}
