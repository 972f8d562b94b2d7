//! # Relay
//!
//! **A transport-agnostic HTTP middleware pipeline.**
//!
//! An outer HTTP layer hands Relay a raw request and gets a raw response
//! back. In between, the request runs through an ordered chain of
//! middleware units, each of which can act before and after the rest of
//! the chain or answer on its own.
//!
//! - [`core`]: request and response contexts, handlers, errors
//! - [`middleware`]: the `Middleware` trait, pipeline builder, dispatcher and units
//! - [`config`]: typed, layered configuration
//! - [`telemetry`]: structured logging and Prometheus metrics
//!
//! ## Quick Start
//!
//! ```no_run
//! use relay::config::ConfigLoader;
//! use relay::core::{handler_fn, RawRequest, ResponseContext};
//!
//! # async fn run() -> Result<(), relay::Error> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("relay.toml")?
//!     .with_env_prefix("RELAY")
//!     .load()?;
//! relay::init_telemetry(&config)?;
//!
//! let dispatcher = relay::dispatcher_from_config(
//!     &config,
//!     handler_fn(|ctx| {
//!         let greeting = format!("hello {}", ctx.path());
//!         async move { Ok(ResponseContext::text(http::StatusCode::OK, greeting)) }
//!     }),
//! )?;
//!
//! let response = dispatcher.handle(RawRequest::new("GET", "/world")).await;
//! assert_eq!(response.status, 200);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! RawRequest → ErrorBoundary → RequestId → Logging → … → terminal
//!                                                          ↓
//! RawResponse ← ErrorBoundary ← RequestId ← Logging ← … ←──┘
//! ```

#![doc(html_root_url = "https://docs.rs/relay/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod standard;

pub use error::{Error, Result};
pub use standard::{
    dispatcher_from_config, init_telemetry, pipeline_builder, pipeline_from_config,
    telemetry_config,
};

// Re-export member crates
pub use relay_config as config;
pub use relay_core as core;
pub use relay_middleware as middleware;
pub use relay_telemetry as telemetry;

/// Common imports.
///
/// ```
/// use relay::prelude::*;
/// ```
pub mod prelude {
    pub use relay_config::{ConfigLoader, RelayConfig};
    pub use relay_core::{
        handler_fn, Handler, HandlerError, HandlerResult, Identity, RawRequest, RawResponse,
        RequestContext, RequestId, ResponseContext,
    };
    pub use relay_middleware::stages::{
        AuthenticationUnit, ErrorBoundaryUnit, LoggingUnit, RateLimitUnit,
    };
    pub use relay_middleware::{from_fn, Dispatcher, Middleware, Next, Pipeline};
}
