//! In-flight request limit.
//!
//! Bounds how many requests are inside the rest of the chain at once. When
//! every permit is taken the unit answers `503 Service Unavailable` with
//! `Retry-After: 1` instead of queueing.

use crate::middleware::{Middleware, Next};
use http::StatusCode;
use relay_core::{BoxFuture, HandlerResult, RequestContext, ResponseContext};
use relay_telemetry::metrics;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Caps concurrent requests with a semaphore.
///
/// # Cancellation
///
/// The permit is an owned guard held across `next`. It is returned when the
/// request completes, fails, panics or is dropped mid-flight.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimitUnit {
    max: usize,
    permits: Arc<Semaphore>,
}

impl ConcurrencyLimitUnit {
    /// Allows at most `max` requests in flight.
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            max,
            permits: Arc::new(Semaphore::new(max)),
        }
    }

    /// Configured maximum.
    #[must_use]
    pub const fn max(&self) -> usize {
        self.max
    }

    /// Permits currently free.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Middleware for ConcurrencyLimitUnit {
    fn name(&self) -> &'static str {
        "concurrency_limit"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let Ok(_permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                tracing::debug!(max = self.max, path = ctx.path(), "concurrency limit reached");
                metrics::record_short_circuit(self.name(), 503);
                return Ok(ResponseContext::json_error(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "OVERLOADED",
                    "too many requests in flight",
                    ctx.request_id(),
                )
                .with_header("retry-after", "1"));
            };
            next.run(ctx).await
        })
    }
}
