//! Access logging unit.
//!
//! Records each request on the way in (method, path, wall-clock time) and on
//! the way out (status and elapsed time). Entries go to `tracing` on the
//! [`ACCESS_TARGET`] target and, optionally, to a [`LogSink`].
//!
//! ## Failure behavior
//!
//! - A sink that returns an error or panics is logged at `warn` and ignored;
//!   logging never changes the outcome of a request.
//! - An `Err` from the rest of the chain is recorded as [`LogEntry::Failed`]
//!   and returned unchanged.
//! - If the request future is dropped before the chain finishes, a
//!   [`LogEntry::Cancelled`] entry is recorded from a drop guard. A panic
//!   unwinding through the unit is recorded as `Failed`.

use crate::middleware::{Middleware, Next};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relay_core::{BoxFuture, HandlerResult, Method, RequestContext, RequestId};
use relay_telemetry::ACCESS_TARGET;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// A sink rejected an entry.
#[derive(Debug, Error)]
#[error("log sink failed: {0}")]
pub struct SinkError(pub String);

/// One access-log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// The request entered the unit.
    Started {
        /// Request method.
        method: Method,
        /// Request path.
        path: String,
        /// Request id, if one was assigned by an earlier unit.
        request_id: Option<RequestId>,
        /// Wall-clock arrival time.
        at: DateTime<Utc>,
    },
    /// The chain produced a response.
    Completed {
        /// Request method.
        method: Method,
        /// Request path.
        path: String,
        /// Request id.
        request_id: Option<RequestId>,
        /// Response status code.
        status: u16,
        /// Time spent in the rest of the chain.
        elapsed: Duration,
    },
    /// The chain returned an error or panicked.
    Failed {
        /// Request method.
        method: Method,
        /// Request path.
        path: String,
        /// Request id.
        request_id: Option<RequestId>,
        /// Error description.
        error: String,
        /// Time spent before the failure.
        elapsed: Duration,
    },
    /// The request future was dropped before the chain finished.
    Cancelled {
        /// Request method.
        method: Method,
        /// Request path.
        path: String,
        /// Request id.
        request_id: Option<RequestId>,
        /// Time spent before cancellation.
        elapsed: Duration,
    },
}

impl LogEntry {
    /// Short name of the entry kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Destination for access-log entries.
///
/// Called synchronously from the request path (and from a drop guard on
/// cancellation), so implementations should be fast and must not block on
/// async work.
pub trait LogSink: Send + Sync + 'static {
    /// Records one entry.
    fn record(&self, entry: &LogEntry) -> Result<(), SinkError>;
}

/// A sink that keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded entries.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Returns the kinds of all recorded entries, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<&'static str> {
        self.entries.lock().iter().map(LogEntry::kind).collect()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl LogSink for MemoryLogSink {
    fn record(&self, entry: &LogEntry) -> Result<(), SinkError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

/// Logs each request before and after the rest of the chain.
#[derive(Clone, Default)]
pub struct LoggingUnit {
    sink: Option<Arc<dyn LogSink>>,
}

impl LoggingUnit {
    /// Creates a unit that only emits `tracing` events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also forwards entries to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn forward(&self, entry: &LogEntry) {
        let Some(sink) = &self.sink else {
            return;
        };
        match std::panic::catch_unwind(AssertUnwindSafe(|| sink.record(entry))) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::warn!(unit = "logging", error = %error, entry = entry.kind(), "dropping access log entry");
            }
            Err(_) => {
                tracing::warn!(unit = "logging", entry = entry.kind(), "log sink panicked; entry dropped");
            }
        }
    }
}

impl std::fmt::Debug for LoggingUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingUnit")
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

/// Records `Cancelled` (or `Failed` on panic) unless disarmed.
struct InFlightEntry<'a> {
    unit: &'a LoggingUnit,
    method: Method,
    path: String,
    request_id: Option<RequestId>,
    start: Instant,
    armed: bool,
}

impl InFlightEntry<'_> {
    fn finish(mut self) -> (Method, String, Option<RequestId>, Duration) {
        self.armed = false;
        (
            self.method,
            std::mem::take(&mut self.path),
            self.request_id,
            self.start.elapsed(),
        )
    }
}

impl Drop for InFlightEntry<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let elapsed = self.start.elapsed();
        let method = self.method;
        let path = std::mem::take(&mut self.path);
        let request_id = self.request_id;

        let entry = if std::thread::panicking() {
            tracing::error!(target: ACCESS_TARGET, method = %method, path = %path, elapsed_ms = elapsed_ms(elapsed), "request panicked");
            LogEntry::Failed {
                method,
                path,
                request_id,
                error: "panicked".to_string(),
                elapsed,
            }
        } else {
            tracing::warn!(target: ACCESS_TARGET, method = %method, path = %path, elapsed_ms = elapsed_ms(elapsed), "request cancelled");
            LogEntry::Cancelled {
                method,
                path,
                request_id,
                elapsed,
            }
        };
        self.unit.forward(&entry);
    }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

impl Middleware for LoggingUnit {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let method = ctx.method();
            let path = ctx.path().to_string();
            let request_id = ctx.request_id();

            tracing::info!(
                target: ACCESS_TARGET,
                method = %method,
                path = %path,
                request_id = ?request_id,
                "request started"
            );
            self.forward(&LogEntry::Started {
                method,
                path: path.clone(),
                request_id,
                at: Utc::now(),
            });

            let in_flight = InFlightEntry {
                unit: self,
                method,
                path,
                request_id,
                start: Instant::now(),
                armed: true,
            };

            let result = next.run(ctx).await;
            let (method, path, request_id, elapsed) = in_flight.finish();

            let entry = match &result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    tracing::info!(
                        target: ACCESS_TARGET,
                        method = %method,
                        path = %path,
                        status,
                        elapsed_ms = elapsed_ms(elapsed),
                        request_id = ?request_id,
                        "request completed"
                    );
                    LogEntry::Completed {
                        method,
                        path,
                        request_id,
                        status,
                        elapsed,
                    }
                }
                Err(error) => {
                    tracing::error!(
                        target: ACCESS_TARGET,
                        method = %method,
                        path = %path,
                        error = %error,
                        elapsed_ms = elapsed_ms(elapsed),
                        request_id = ?request_id,
                        "request failed"
                    );
                    LogEntry::Failed {
                        method,
                        path,
                        request_id,
                        error: error.to_string(),
                        elapsed,
                    }
                }
            };
            self.forward(&entry);

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pipeline;
    use http::StatusCode;
    use relay_core::{handler_fn, HandlerError, ResponseContext};

    struct FailingSink;

    impl LogSink for FailingSink {
        fn record(&self, _entry: &LogEntry) -> Result<(), SinkError> {
            Err(SinkError("disk full".to_string()))
        }
    }

    struct PanickingSink;

    impl LogSink for PanickingSink {
        fn record(&self, _entry: &LogEntry) -> Result<(), SinkError> {
            panic!("sink bug");
        }
    }

    fn ok_pipeline(unit: LoggingUnit) -> Pipeline {
        Pipeline::builder()
            .register(unit)
            .terminal(handler_fn(|_| async { Ok(ResponseContext::text(StatusCode::OK, "ok")) }))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_records_start_and_completion() {
        let sink = Arc::new(MemoryLogSink::new());
        let pipeline = ok_pipeline(LoggingUnit::new().with_sink(sink.clone()));

        let mut ctx = RequestContext::mock();
        pipeline.execute(&mut ctx).await.unwrap();

        let entries = sink.entries();
        assert_eq!(sink.kinds(), vec!["started", "completed"]);
        match &entries[1] {
            LogEntry::Completed { method, path, status, .. } => {
                assert_eq!(*method, Method::Get);
                assert_eq!(path, "/");
                assert_eq!(*status, 200);
            }
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_recorded_and_propagated() {
        let sink = Arc::new(MemoryLogSink::new());
        let pipeline = Pipeline::builder()
            .register(LoggingUnit::new().with_sink(sink.clone()))
            .terminal(handler_fn(|_| async { Err(HandlerError::msg("db down")) }))
            .build()
            .unwrap();

        let mut ctx = RequestContext::mock();
        let err = pipeline.execute(&mut ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "db down");
        assert!(matches!(
            sink.entries().last(),
            Some(LogEntry::Failed { error, .. }) if error == "db down"
        ));
    }

    #[tokio::test]
    async fn test_sink_error_is_swallowed() {
        let pipeline = ok_pipeline(LoggingUnit::new().with_sink(Arc::new(FailingSink)));
        let mut ctx = RequestContext::mock();
        let response = pipeline.execute(&mut ctx).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sink_panic_is_swallowed() {
        let pipeline = ok_pipeline(LoggingUnit::new().with_sink(Arc::new(PanickingSink)));
        let mut ctx = RequestContext::mock();
        let response = pipeline.execute(&mut ctx).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cancellation_recorded() {
        let sink = Arc::new(MemoryLogSink::new());
        let pipeline = Pipeline::builder()
            .register(LoggingUnit::new().with_sink(sink.clone()))
            .terminal(handler_fn(|_| async {
                std::future::pending::<()>().await;
                Ok(ResponseContext::new(StatusCode::OK))
            }))
            .build()
            .unwrap();

        let mut ctx = RequestContext::mock();
        let outcome =
            tokio::time::timeout(Duration::from_millis(10), pipeline.execute(&mut ctx)).await;
        assert!(outcome.is_err());
        assert_eq!(sink.kinds(), vec!["started", "cancelled"]);
    }

    #[test]
    fn test_memory_sink_clear() {
        let sink = MemoryLogSink::new();
        sink.record(&LogEntry::Cancelled {
            method: Method::Get,
            path: "/".to_string(),
            request_id: None,
            elapsed: Duration::ZERO,
        })
        .unwrap();
        assert_eq!(sink.entries().len(), 1);
        sink.clear();
        assert!(sink.entries().is_empty());
    }
}
