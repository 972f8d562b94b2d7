//! In-memory testing for Relay pipelines.
//!
//! [`TestClient`] drives a [`Dispatcher`](relay_middleware::Dispatcher)
//! directly: no listener, no port, no transport. Every request still goes
//! through context building, the full unit chain and response emission, so
//! what a test observes is what a transport would send.
//!
//! ## Example
//!
//! ```
//! use http::StatusCode;
//! use relay_core::{handler_fn, ResponseContext};
//! use relay_middleware::{stages::RateLimitUnit, Pipeline};
//! use relay_test::TestClient;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let pipeline = Pipeline::builder()
//!     .register(RateLimitUnit::new(1, Duration::from_secs(60)))
//!     .terminal(handler_fn(|_| async { Ok(ResponseContext::new(StatusCode::OK)) }))
//!     .build()
//!     .unwrap();
//! let client = TestClient::from_pipeline(pipeline).with_default_header("x-client-id", "c1");
//!
//! client.get("/").send().await.assert_success();
//! client
//!     .get("/")
//!     .send()
//!     .await
//!     .assert_status(StatusCode::TOO_MANY_REQUESTS)
//!     .assert_error_code("RATE_LIMITED");
//! # });
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::TestRequest;
pub use response::TestResponse;
