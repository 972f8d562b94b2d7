//! Rate limiting unit.
//!
//! Counts requests per client key in fixed time windows. Within a window the
//! first `limit` requests pass through; the next one is answered with
//! `429 Too Many Requests` and a `Retry-After` header, without calling the
//! rest of the chain.
//!
//! ## Key sources
//!
//! - **Header**: value of a request header (default `x-client-id`)
//! - **Identity**: subject of the authenticated caller
//! - **Global**: one bucket for every request
//! - **Custom**: any function of the request context
//!
//! A request with no usable key is counted in the shared `anonymous` bucket.
//!
//! ## Response headers
//!
//! Allowed responses carry:
//! - `x-ratelimit-limit`: maximum requests per window
//! - `x-ratelimit-remaining`: requests left in the current window
//! - `x-ratelimit-reset`: seconds until the window resets
//!
//! Rejected responses additionally carry `retry-after`.
//!
//! ## Example
//!
//! ```
//! use relay_middleware::stages::RateLimitUnit;
//! use std::time::Duration;
//!
//! let unit = RateLimitUnit::new(100, Duration::from_secs(60)).per_header("x-api-key");
//! assert_eq!(unit.limit(), 100);
//! ```

use crate::middleware::{Middleware, Next};
use dashmap::DashMap;
use http::StatusCode;
use relay_core::{BoxFuture, HandlerResult, RequestContext, ResponseContext};
use relay_telemetry::metrics;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Rate limit header names.
pub mod headers {
    /// Maximum requests allowed in the window.
    pub const LIMIT: &str = "x-ratelimit-limit";
    /// Requests remaining in the current window.
    pub const REMAINING: &str = "x-ratelimit-remaining";
    /// Seconds until the window resets.
    pub const RESET: &str = "x-ratelimit-reset";
    /// Seconds to wait before retrying (on 429 only).
    pub const RETRY_AFTER: &str = "retry-after";
}

/// Default header used to identify clients.
pub const DEFAULT_KEY_HEADER: &str = "x-client-id";

/// Bucket for requests without a usable key.
pub const ANONYMOUS_KEY: &str = "anonymous";

const GLOBAL_KEY: &str = "global";

/// Tracked keys above which expired windows are swept.
const DEFAULT_PRUNE_THRESHOLD: usize = 10_000;

const DEFAULT_MESSAGE: &str = "Too many requests. Please try again later.";

/// How the rate limit key is derived from a request.
#[derive(Clone)]
pub enum KeyExtractor {
    /// Value of the named request header.
    Header(String),
    /// Subject of the identity stored by an authentication unit.
    Identity,
    /// One bucket for all requests.
    Global,
    /// Custom extraction.
    Custom(Arc<dyn Fn(&RequestContext) -> Option<String> + Send + Sync>),
}

impl Default for KeyExtractor {
    fn default() -> Self {
        Self::Header(DEFAULT_KEY_HEADER.to_string())
    }
}

impl fmt::Debug for KeyExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header(h) => f.debug_tuple("KeyExtractor::Header").field(h).finish(),
            Self::Identity => write!(f, "KeyExtractor::Identity"),
            Self::Global => write!(f, "KeyExtractor::Global"),
            Self::Custom(_) => write!(f, "KeyExtractor::Custom(<fn>)"),
        }
    }
}

impl KeyExtractor {
    fn extract(&self, ctx: &RequestContext) -> String {
        let key = match self {
            Self::Header(name) => ctx
                .header(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from),
            Self::Identity => ctx.identity().map(|identity| identity.subject.clone()),
            Self::Global => Some(GLOBAL_KEY.to_string()),
            Self::Custom(f) => f(ctx),
        };
        key.unwrap_or_else(|| ANONYMOUS_KEY.to_string())
    }
}

/// Counter for one key.
#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    started: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Allowed { remaining: u64, reset_in: Duration },
    Limited { reset_in: Duration },
}

/// Fixed-window rate limiter.
///
/// The window map is a [`DashMap`]: the check-and-increment for a key happens
/// under that key's shard lock, so concurrent requests never over-admit.
/// Clones share the same counters.
///
/// # Cancellation
///
/// A request is counted when it is admitted. Dropping the request future
/// afterwards does not refund the slot, the same as a completed request.
#[derive(Clone)]
pub struct RateLimitUnit {
    limit: u64,
    window: Duration,
    key: KeyExtractor,
    message: String,
    prune_threshold: usize,
    windows: Arc<DashMap<String, Window>>,
}

impl RateLimitUnit {
    /// Creates a limiter admitting `limit` requests per `window` and client.
    #[must_use]
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            key: KeyExtractor::default(),
            message: DEFAULT_MESSAGE.to_string(),
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
            windows: Arc::new(DashMap::new()),
        }
    }

    /// Sets the key extractor.
    #[must_use]
    pub fn key(mut self, key: KeyExtractor) -> Self {
        self.key = key;
        self
    }

    /// Keys requests by a header value.
    #[must_use]
    pub fn per_header(self, header: impl Into<String>) -> Self {
        self.key(KeyExtractor::Header(header.into()))
    }

    /// Keys requests by the authenticated subject.
    ///
    /// Register after an authentication unit.
    #[must_use]
    pub fn per_identity(self) -> Self {
        self.key(KeyExtractor::Identity)
    }

    /// Uses a single bucket for all requests.
    #[must_use]
    pub fn global(self) -> Self {
        self.key(KeyExtractor::Global)
    }

    /// Keys requests with a custom function.
    #[must_use]
    pub fn key_extractor<F>(self, f: F) -> Self
    where
        F: Fn(&RequestContext) -> Option<String> + Send + Sync + 'static,
    {
        self.key(KeyExtractor::Custom(Arc::new(f)))
    }

    /// Sets the message of the 429 envelope.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Sets how many keys may be tracked before expired windows are swept.
    #[must_use]
    pub fn prune_threshold(mut self, threshold: usize) -> Self {
        self.prune_threshold = threshold;
        self
    }

    /// Requests admitted per window.
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    fn check(&self, key: String) -> Decision {
        let now = Instant::now();
        if self.windows.len() > self.prune_threshold {
            self.prune(now);
        }

        let mut window = self.windows.entry(key).or_insert(Window {
            count: 0,
            started: now,
        });
        if now.saturating_duration_since(window.started) >= self.window {
            window.count = 0;
            window.started = now;
        }

        let reset_in = self
            .window
            .saturating_sub(now.saturating_duration_since(window.started));
        if window.count >= self.limit {
            Decision::Limited { reset_in }
        } else {
            window.count += 1;
            Decision::Allowed {
                remaining: self.limit - window.count,
                reset_in,
            }
        }
    }

    fn prune(&self, now: Instant) {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        tracing::debug!(
            before,
            after = self.windows.len(),
            "pruned expired rate limit windows"
        );
    }

    fn limited(&self, ctx: &RequestContext, reset_in: Duration) -> ResponseContext {
        let retry_after = ceil_secs(reset_in).max(1);
        ResponseContext::json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            &self.message,
            ctx.request_id(),
        )
        .with_header(headers::LIMIT, self.limit.to_string())
        .with_header(headers::REMAINING, "0")
        .with_header(headers::RESET, retry_after.to_string())
        .with_header(headers::RETRY_AFTER, retry_after.to_string())
    }
}

impl fmt::Debug for RateLimitUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitUnit")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("key", &self.key)
            .field("tracked_keys", &self.windows.len())
            .finish_non_exhaustive()
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration
        .as_secs()
        .saturating_add(u64::from(duration.subsec_nanos() > 0))
}

impl Middleware for RateLimitUnit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let key = self.key.extract(ctx);
            match self.check(key) {
                Decision::Limited { reset_in } => {
                    tracing::debug!(
                        path = ctx.path(),
                        request_id = ?ctx.request_id(),
                        "rate limit exceeded"
                    );
                    metrics::record_short_circuit(self.name(), 429);
                    Ok(self.limited(ctx, reset_in))
                }
                Decision::Allowed {
                    remaining,
                    reset_in,
                } => {
                    let mut response = next.run(ctx).await?;
                    let out = response.headers_mut();
                    out.insert(headers::LIMIT, self.limit.to_string());
                    out.insert(headers::REMAINING, remaining.to_string());
                    out.insert(headers::RESET, ceil_secs(reset_in).to_string());
                    Ok(response)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pipeline;
    use relay_core::{handler_fn, Identity, RawRequest, IDENTITY_KEY};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pipeline(unit: RateLimitUnit) -> Pipeline {
        Pipeline::builder()
            .register(unit)
            .terminal(handler_fn(|_| async {
                Ok(ResponseContext::text(StatusCode::OK, "ok"))
            }))
            .build()
            .unwrap()
    }

    fn from_client(client: &str) -> RequestContext {
        RequestContext::from_raw(RawRequest::new("GET", "/").header(DEFAULT_KEY_HEADER, client))
            .unwrap()
    }

    async fn status_for(pipeline: &Pipeline, client: &str) -> StatusCode {
        pipeline
            .execute(&mut from_client(client))
            .await
            .unwrap()
            .status()
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_window_saturates_reset() {
        let pipeline = pipeline(RateLimitUnit::new(1, Duration::MAX));

        let response = pipeline.execute(&mut from_client("a")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.header(headers::RESET), Some(u64::MAX.to_string().as_str()));

        let response = pipeline.execute(&mut from_client("a")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.header(headers::RETRY_AFTER), Some(u64::MAX.to_string().as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nth_passes_and_next_is_rejected() {
        let pipeline = pipeline(RateLimitUnit::new(3, Duration::from_secs(60)));

        for _ in 0..3 {
            assert_eq!(status_for(&pipeline, "a").await, StatusCode::OK);
        }

        let response = pipeline.execute(&mut from_client("a")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.header(headers::RETRY_AFTER), Some("60"));
        assert_eq!(response.header(headers::REMAINING), Some("0"));

        let body: serde_json::Value =
            serde_json::from_slice(&response.into_bytes().await).unwrap();
        assert_eq!(body["error"]["code"], "RATE_LIMITED");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_skips_downstream() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let pipeline = Pipeline::builder()
            .register(RateLimitUnit::new(1, Duration::from_secs(10)))
            .terminal(handler_fn(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                async { Ok(ResponseContext::new(StatusCode::OK)) }
            }))
            .build()
            .unwrap();

        status_for(&pipeline, "a").await;
        status_for(&pipeline, "a").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_allowed_headers() {
        let pipeline = pipeline(RateLimitUnit::new(5, Duration::from_secs(30)));
        let response = pipeline.execute(&mut from_client("a")).await.unwrap();
        assert_eq!(response.header(headers::LIMIT), Some("5"));
        assert_eq!(response.header(headers::REMAINING), Some("4"));
        assert_eq!(response.header(headers::RESET), Some("30"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets() {
        let pipeline = pipeline(RateLimitUnit::new(1, Duration::from_secs(60)));
        assert_eq!(status_for(&pipeline, "a").await, StatusCode::OK);

        tokio::time::advance(Duration::from_secs(45)).await;
        let response = pipeline.execute(&mut from_client("a")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.header(headers::RETRY_AFTER), Some("15"));

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(status_for(&pipeline, "a").await, StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_at_least_one_second() {
        let pipeline = pipeline(RateLimitUnit::new(1, Duration::from_millis(300)));
        status_for(&pipeline, "a").await;
        let response = pipeline.execute(&mut from_client("a")).await.unwrap();
        assert_eq!(response.header(headers::RETRY_AFTER), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_are_independent() {
        let pipeline = pipeline(RateLimitUnit::new(1, Duration::from_secs(60)));
        assert_eq!(status_for(&pipeline, "a").await, StatusCode::OK);
        assert_eq!(status_for(&pipeline, "b").await, StatusCode::OK);
        assert_eq!(status_for(&pipeline, "a").await, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_key_shares_anonymous_bucket() {
        let unit = RateLimitUnit::new(1, Duration::from_secs(60));
        let pipeline = pipeline(unit.clone());

        let mut first = RequestContext::mock();
        let mut second = RequestContext::mock();
        assert_eq!(pipeline.execute(&mut first).await.unwrap().status(), StatusCode::OK);
        assert_eq!(
            pipeline.execute(&mut second).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert!(unit.windows.contains_key(ANONYMOUS_KEY));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_key() {
        let unit = RateLimitUnit::new(1, Duration::from_secs(60)).per_identity();
        let mut ctx = RequestContext::mock();
        ctx.state_mut()
            .insert(IDENTITY_KEY, Identity::new("alice", "Bearer"));
        assert_eq!(unit.key.extract(&ctx), "alice");
        assert_eq!(unit.key.extract(&RequestContext::mock()), ANONYMOUS_KEY);
    }

    #[test]
    fn test_custom_and_global_keys() {
        let custom = RateLimitUnit::new(1, Duration::from_secs(1))
            .key_extractor(|ctx| Some(ctx.path().to_string()));
        assert_eq!(custom.key.extract(&RequestContext::mock()), "/");
        assert!(format!("{:?}", custom.key).contains("<fn>"));

        let global = RateLimitUnit::new(1, Duration::from_secs(1)).global();
        assert_eq!(global.key.extract(&from_client("x")), GLOBAL_KEY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prunes_expired_windows() {
        let unit = RateLimitUnit::new(10, Duration::from_secs(1)).prune_threshold(2);
        for client in ["a", "b", "c"] {
            unit.check(client.to_string());
        }
        assert_eq!(unit.tracked_keys(), 3);

        tokio::time::advance(Duration::from_secs(2)).await;
        unit.check("d".to_string());
        assert_eq!(unit.tracked_keys(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_never_over_admit() {
        let pipeline = Arc::new(pipeline(RateLimitUnit::new(10, Duration::from_secs(60))));
        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move { status_for(&pipeline, "shared").await })
            })
            .collect();

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() == StatusCode::OK {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }
}
