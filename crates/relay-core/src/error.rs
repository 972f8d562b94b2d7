//! Error types for Relay.
//!
//! Relay separates three kinds of failure:
//!
//! | Type | Raised when | Surfaced as |
//! |---|---|---|
//! | [`MalformedRequestError`] | raw input cannot become a [`RequestContext`](crate::RequestContext) | `400` by the dispatcher |
//! | [`InvalidPipelineError`] | a pipeline is assembled without a terminal handler | build-time error |
//! | [`HandlerError`] | a middleware unit or the terminal handler fails | `500` by an error boundary or the dispatcher |
//!
//! Short-circuit responses such as `401` or `429` are not errors: they are
//! ordinary [`ResponseContext`](crate::ResponseContext) values returned
//! without delegating to the rest of the chain.

use http::StatusCode;
use std::any::Any;
use thiserror::Error;

/// Result type produced by handlers and middleware units.
pub type HandlerResult = Result<crate::ResponseContext, HandlerError>;

/// Raw input could not be turned into a valid request context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedRequestError {
    /// The method is not one of the recognized verbs.
    #[error("unrecognized method `{0}`")]
    UnknownMethod(String),

    /// A header name is empty or contains control characters.
    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    /// A header value contains CR, LF or NUL.
    #[error("invalid value for header `{0}`")]
    InvalidHeaderValue(String),

    /// The request target is empty or contains whitespace.
    #[error("invalid request target {0:?}")]
    InvalidTarget(String),

    /// The query string could not be decoded.
    #[error("invalid query string: {0}")]
    InvalidQuery(String),
}

/// A pipeline was assembled incorrectly.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidPipelineError {
    /// No terminal handler was supplied.
    #[error("pipeline has no terminal handler")]
    MissingTerminal,
}

/// A status code outside the `100..=599` range.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("status code {0} is outside 100..=599")]
pub struct InvalidStatusError(pub u16);

/// Failure raised by a middleware unit or terminal handler.
///
/// Units propagate these upward unchanged unless they are explicitly
/// designed as a boundary.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// A plain failure message.
    #[error("{0}")]
    Message(String),

    /// An arbitrary underlying error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// A unit or handler panicked; the payload is rendered as text.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Creates a message error.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Converts a panic payload captured by `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let text = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(text)
    }

    /// Returns true if this error was converted from a panic.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}

/// Umbrella error for the facade APIs.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Malformed inbound request.
    #[error(transparent)]
    Malformed(#[from] MalformedRequestError),

    /// Misassembled pipeline.
    #[error(transparent)]
    InvalidPipeline(#[from] InvalidPipelineError),

    /// Invalid status code.
    #[error(transparent)]
    InvalidStatus(#[from] InvalidStatusError),

    /// Handler or middleware failure.
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl RelayError {
    /// Returns the HTTP status this error is surfaced as.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::InvalidPipeline(_) | Self::InvalidStatus(_) | Self::Handler(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
