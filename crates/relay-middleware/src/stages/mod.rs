//! Reference middleware units.
//!
//! None of these run unless registered. The usual outermost-first order is:
//!
//! 1. [`error_boundary`] - Turn failures into a `500` envelope
//! 2. [`request_id`] - Generate/propagate request ID
//! 3. [`logging`] - Access log entries
//! 4. [`timeout`] - Request deadline
//! 5. [`cors`] - Preflight handling and CORS headers
//! 6. [`concurrency`] - In-flight limit
//! 7. [`rate_limit`] - Fixed-window throttling
//! 8. [`authentication`] - Bearer credential check

pub mod authentication;
pub mod concurrency;
pub mod cors;
pub mod error_boundary;
pub mod logging;
pub mod rate_limit;
pub mod request_id;
pub mod timeout;

pub use authentication::{AuthenticationUnit, StaticTokens, TokenValidator};
pub use concurrency::ConcurrencyLimitUnit;
pub use cors::{AllowedOrigins, CorsBuilder, CorsUnit};
pub use error_boundary::ErrorBoundaryUnit;
pub use logging::{LogEntry, LogSink, LoggingUnit, MemoryLogSink, SinkError};
pub use rate_limit::{KeyExtractor, RateLimitUnit};
pub use request_id::RequestIdUnit;
pub use timeout::TimeoutUnit;
