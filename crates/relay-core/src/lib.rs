//! # Relay Core
//!
//! Core types for the Relay middleware pipeline.
//!
//! - [`RequestContext`] - Per-request data: method, path, query, headers, body and shared [`State`]
//! - [`ResponseContext`] - Status, headers and body flowing back out through the chain
//! - [`RawRequest`] / [`RawResponse`] - Unvalidated transport shapes
//! - [`Handler`] - The terminal step of a pipeline
//! - [`HandlerError`], [`MalformedRequestError`], [`InvalidPipelineError`] - Error taxonomy

#![doc(html_root_url = "https://docs.rs/relay-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
pub mod handler;
pub mod headers;
mod identity;
mod method;
mod query;
mod raw;
mod response;
pub mod state;

pub use context::RequestContext;
pub use error::{
    HandlerError, HandlerResult, InvalidPipelineError, InvalidStatusError, MalformedRequestError,
    RelayError,
};
pub use handler::{handler_fn, BoxFuture, BoxedHandler, FnHandler, Handler, NotFound};
pub use headers::Headers;
pub use identity::{Identity, RequestId};
pub use method::Method;
pub use query::QueryParams;
pub use raw::{RawRequest, RawResponse};
pub use response::{ResponseBody, ResponseContext, MAX_STATUS, MIN_STATUS};
pub use state::{State, IDENTITY_KEY, REQUEST_ID_KEY};
