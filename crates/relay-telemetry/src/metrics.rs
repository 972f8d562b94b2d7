//! Prometheus metrics for the dispatcher and middleware units.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `relay_requests_total` | Counter | `method`, `status` | Requests answered |
//! | `relay_request_duration_seconds` | Histogram | `method` | Dispatch latency |
//! | `relay_in_flight_requests` | Gauge | - | Requests currently dispatched |
//! | `relay_dispatch_fallbacks_total` | Counter | `reason` | Responses produced by the dispatcher itself |
//! | `relay_short_circuits_total` | Counter | `unit`, `status` | Responses produced by a unit without calling `next` |
//!
//! Recording functions are no-ops until a recorder is installed.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Requests answered.
pub const REQUESTS_TOTAL: &str = "relay_requests_total";
/// Dispatch latency.
pub const REQUEST_DURATION_SECONDS: &str = "relay_request_duration_seconds";
/// Requests currently in flight.
pub const IN_FLIGHT_REQUESTS: &str = "relay_in_flight_requests";
/// Dispatcher fallback responses.
pub const DISPATCH_FALLBACKS_TOTAL: &str = "relay_dispatch_fallbacks_total";
/// Unit short-circuit responses.
pub const SHORT_CIRCUITS_TOTAL: &str = "relay_short_circuits_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Histogram buckets for request duration, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // 1ms .. 10s
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Installs the global Prometheus recorder.
///
/// Does nothing when `config.enabled` is false. There is no HTTP listener;
/// the embedding application exposes [`render_metrics`] however it likes.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidConfig`] for empty buckets and
/// [`TelemetryError::MetricsInit`] if a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let handle = builder(config)?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();

    Ok(())
}

/// Creates a configured builder without installing it.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidConfig`] if the buckets are rejected.
pub fn builder(config: &MetricsConfig) -> TelemetryResult<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))
}

/// Returns the global handle if a recorder was installed.
pub fn metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Renders all metrics in Prometheus text format.
///
/// Returns `None` if metrics were never initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(REQUESTS_TOTAL, "Total number of requests answered");
    describe_histogram!(REQUEST_DURATION_SECONDS, "Request dispatch duration in seconds");
    describe_gauge!(IN_FLIGHT_REQUESTS, "Number of requests currently being dispatched");
    describe_counter!(
        DISPATCH_FALLBACKS_TOTAL,
        "Responses produced by the dispatcher fallback path, by reason"
    );
    describe_counter!(
        SHORT_CIRCUITS_TOTAL,
        "Responses produced by a middleware unit without calling the rest of the chain"
    );
}

/// Records a completed request.
pub fn record_request(method: &str, status: u16, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(REQUEST_DURATION_SECONDS, "method" => method.to_string())
        .record(duration.as_secs_f64());
}

/// Records a response produced by the dispatcher fallback path.
///
/// `reason` is one of `malformed_request`, `handler_error`, `panic`,
/// `invalid_status` or `body_panic`.
pub fn record_fallback(reason: &'static str) {
    counter!(DISPATCH_FALLBACKS_TOTAL, "reason" => reason).increment(1);
}

/// Records a short-circuit response from a middleware unit.
pub fn record_short_circuit(unit: &'static str, status: u16) {
    counter!(
        SHORT_CIRCUITS_TOTAL,
        "unit" => unit,
        "status" => status.to_string()
    )
    .increment(1);
}

/// Increments the in-flight gauge.
pub fn increment_in_flight() {
    gauge!(IN_FLIGHT_REQUESTS).increment(1.0);
}

/// Decrements the in-flight gauge.
pub fn decrement_in_flight() {
    gauge!(IN_FLIGHT_REQUESTS).decrement(1.0);
}

/// Guard that decrements the in-flight gauge on drop.
///
/// The gauge stays accurate when a dispatch future is dropped mid-flight.
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the gauge and returns the guard.
    #[must_use]
    pub fn new() -> Self {
        increment_in_flight();
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        decrement_in_flight();
    }
}
