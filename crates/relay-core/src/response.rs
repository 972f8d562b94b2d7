//! The response produced by the terminal handler or a short-circuiting unit.

use crate::error::InvalidStatusError;
use crate::headers::Headers;
use crate::identity::RequestId;
use crate::raw::RawResponse;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{BoxStream, StreamExt};
use http::StatusCode;
use std::fmt;

/// Lowest status code a response may carry.
pub const MIN_STATUS: u16 = 100;

/// Highest status code a response may carry.
pub const MAX_STATUS: u16 = 599;

/// Response payload.
#[derive(Default)]
pub enum ResponseBody {
    /// No body.
    #[default]
    Empty,
    /// A fully buffered body.
    Full(Bytes),
    /// Chunks produced on demand, collected when the response is emitted.
    Stream(BoxStream<'static, Bytes>),
}

impl ResponseBody {
    /// Returns the buffered bytes, or `None` for a stream.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Empty => Some(&[]),
            Self::Full(bytes) => Some(bytes),
            Self::Stream(_) => None,
        }
    }

    /// Returns true for a streaming body.
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Collects the body into contiguous bytes.
    pub async fn collect(self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Full(bytes) => bytes,
            Self::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk);
                }
                buf.freeze()
            }
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            Self::Empty
        } else {
            Self::Full(bytes)
        }
    }
}

/// Status, headers and body flowing back out through the pipeline.
///
/// The status is chosen when the response is constructed and cannot be
/// changed afterwards. Units unwinding through the chain may add headers.
///
/// # Example
///
/// ```
/// use http::StatusCode;
/// use relay_core::ResponseContext;
///
/// let response = ResponseContext::text(StatusCode::OK, "ok").with_header("cache-control", "no-store");
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.header("Cache-Control"), Some("no-store"));
/// ```
#[derive(Debug)]
pub struct ResponseContext {
    status: StatusCode,
    headers: Headers,
    body: ResponseBody,
}

impl ResponseContext {
    /// Creates a response with an empty body.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: ResponseBody::Empty,
        }
    }

    /// Creates a response from a numeric status, rejecting codes outside `100..=599`.
    pub fn from_code(code: u16) -> Result<Self, InvalidStatusError> {
        if !(MIN_STATUS..=MAX_STATUS).contains(&code) {
            return Err(InvalidStatusError(code));
        }
        StatusCode::from_u16(code)
            .map(Self::new)
            .map_err(|_| InvalidStatusError(code))
    }

    /// Creates a response with an empty body. Alias of [`new`](Self::new).
    #[must_use]
    pub fn empty(status: StatusCode) -> Self {
        Self::new(status)
    }

    /// Creates a `text/plain` response.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_body(Bytes::from(body.into()))
    }

    /// Creates an `application/json` response.
    #[must_use]
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status)
            .with_header("content-type", "application/json")
            .with_body(Bytes::from(value.to_string()))
    }

    /// Creates a JSON error envelope:
    /// `{"error":{"code":...,"message":...,"request_id":...}}`.
    ///
    /// `request_id` is omitted when `None`.
    #[must_use]
    pub fn json_error(
        status: StatusCode,
        code: &str,
        message: &str,
        request_id: Option<RequestId>,
    ) -> Self {
        let mut error = serde_json::json!({
            "code": code,
            "message": message,
        });
        if let Some(id) = request_id {
            error["request_id"] = serde_json::Value::String(id.to_string());
        }
        Self::json(status, &serde_json::json!({ "error": error }))
    }

    /// Creates a response whose body is produced by `stream`.
    pub fn stream(status: StatusCode, stream: BoxStream<'static, Bytes>) -> Self {
        Self::new(status).with_body(ResponseBody::Stream(stream))
    }

    /// Appends a header, keeping existing values for the same name.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<ResponseBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the headers for modification during post-processing.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Returns the first value of a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns the body.
    #[must_use]
    pub const fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Collects the body, consuming the response.
    pub async fn into_bytes(self) -> Bytes {
        self.body.collect().await
    }

    /// Splits the response into its parts.
    #[must_use]
    pub fn into_parts(self) -> (StatusCode, Headers, ResponseBody) {
        (self.status, self.headers, self.body)
    }

    /// Converts to a transport response, collecting any stream.
    pub async fn into_raw(self) -> RawResponse {
        let (status, headers, body) = self.into_parts();
        RawResponse {
            status: status.as_u16(),
            headers: headers.into_pairs(),
            body: body.collect().await,
        }
    }
}
