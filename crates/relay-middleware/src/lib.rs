//! # Relay Middleware
//!
//! Middleware pipeline and dispatcher for Relay.
//!
//! A [`Pipeline`] is an ordered list of [`Middleware`] units in front of a
//! terminal handler. Each unit can act before and after the rest of the
//! chain, or answer on its own without calling it. The [`Dispatcher`] sits
//! between the transport and the pipeline and guarantees a response for
//! every request.
//!
//! ```text
//! RawRequest → Dispatcher → unit[0] → unit[1] → … → terminal
//!                                                      ↓
//! RawResponse ← Dispatcher ← unit[0] ← unit[1] ← … ←──┘
//! ```
//!
//! ## Key Features
//!
//! - **Registration order**: the first registered unit is outermost
//! - **Single `next`**: [`Next::run`] consumes itself, so the rest of the
//!   chain runs at most once per unit invocation
//! - **Fixed chain**: the unit list is frozen when the pipeline is built
//! - **Cancellation**: dropping a request future releases every guard held
//!   by suspended units
//!
//! ## Example
//!
//! ```
//! use http::StatusCode;
//! use relay_core::{handler_fn, RawRequest, ResponseContext};
//! use relay_middleware::stages::{ErrorBoundaryUnit, LoggingUnit, RateLimitUnit};
//! use relay_middleware::{Dispatcher, Pipeline};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let pipeline = Pipeline::builder()
//!     .register(ErrorBoundaryUnit::new())
//!     .register(LoggingUnit::new())
//!     .register(RateLimitUnit::new(2, Duration::from_secs(60)))
//!     .terminal(handler_fn(|_| async { Ok(ResponseContext::text(StatusCode::OK, "ok")) }))
//!     .build()
//!     .unwrap();
//!
//! let dispatcher = Dispatcher::new(pipeline);
//! let response = dispatcher.handle(RawRequest::new("GET", "/")).await;
//! assert_eq!(response.status, 200);
//! # });
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod dispatcher;
pub mod middleware;
pub mod pipeline;
pub mod stages;

pub use dispatcher::{DispatchPhase, Dispatcher};
pub use middleware::{from_fn, FnMiddleware, Middleware, Next};
pub use pipeline::{BoxedMiddleware, Pipeline, PipelineBuilder};
