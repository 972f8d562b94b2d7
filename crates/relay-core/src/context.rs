//! The per-request context carried through the pipeline.
//!
//! A [`RequestContext`] is created once per request by the dispatcher and
//! dropped when the pipeline returns. Its transport-derived fields are fixed
//! at construction; units exchange data through [`State`].

use crate::error::MalformedRequestError;
use crate::headers::Headers;
use crate::identity::{Identity, RequestId};
use crate::method::Method;
use crate::query::QueryParams;
use crate::raw::RawRequest;
use crate::state::{State, IDENTITY_KEY, REQUEST_ID_KEY};
use bytes::Bytes;
use std::time::{Duration, Instant, SystemTime};

/// Per-request data flowing through every middleware unit.
///
/// Method, path, query, headers and body have getters only, so no unit can
/// alter what the client sent. [`state_mut`](Self::state_mut) is the single
/// mutable entry point.
///
/// # Example
///
/// ```
/// use relay_core::{Method, RawRequest, RequestContext};
///
/// let raw = RawRequest::new("GET", "/users?page=2").header("Accept", "application/json");
/// let ctx = RequestContext::from_raw(raw).unwrap();
///
/// assert_eq!(ctx.method(), Method::Get);
/// assert_eq!(ctx.path(), "/users");
/// assert_eq!(ctx.query().get("page"), Some("2"));
/// assert_eq!(ctx.header("accept"), Some("application/json"));
/// ```
#[derive(Debug)]
pub struct RequestContext {
    method: Method,
    path: String,
    query: QueryParams,
    headers: Headers,
    body: Bytes,
    received_at: Instant,
    received_wall: SystemTime,
    state: State,
}

impl RequestContext {
    /// Builds a context from already-validated parts.
    ///
    /// The path is taken as given; use [`from_raw`](Self::from_raw) for
    /// untrusted input.
    pub fn new(
        method: Method,
        path: impl Into<String>,
        query: QueryParams,
        headers: Headers,
        body: Bytes,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            query,
            headers,
            body,
            received_at: Instant::now(),
            received_wall: SystemTime::now(),
            state: State::new(),
        }
    }

    /// Validates and converts a transport request.
    ///
    /// Fails on an unrecognized method, an illegal header name or value, an
    /// empty target or one containing whitespace or control characters, or a
    /// query string that cannot be decoded.
    pub fn from_raw(raw: RawRequest) -> Result<Self, MalformedRequestError> {
        let RawRequest {
            method,
            target,
            headers,
            body,
        } = raw;

        let method: Method = method.parse()?;
        validate_target(&target)?;
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, QueryParams::parse(query)?),
            None => (target.as_str(), QueryParams::new()),
        };
        if !path.starts_with('/') && path != "*" {
            return Err(MalformedRequestError::InvalidTarget(target.clone()));
        }
        let headers = Headers::from_pairs(headers)?;

        Ok(Self::new(method, path, query, headers, body))
    }

    /// Returns the request method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Returns the path component of the target, without the query.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the decoded query parameters.
    #[must_use]
    pub const fn query(&self) -> &QueryParams {
        &self.query
    }

    /// Returns the request headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the first value of a request header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns the body.
    ///
    /// The bytes are reference-counted; cloning the returned value does not
    /// copy the payload.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Monotonic instant at which the context was created.
    #[must_use]
    pub const fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Wall-clock time at which the context was created.
    #[must_use]
    pub const fn received_wall(&self) -> SystemTime {
        self.received_wall
    }

    /// Time elapsed since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.received_at.elapsed()
    }

    /// Returns the shared state bag.
    #[must_use]
    pub const fn state(&self) -> &State {
        &self.state
    }

    /// Returns the shared state bag for writing.
    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// The authenticated caller, if an authentication unit set one.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.state.get::<Identity>(IDENTITY_KEY)
    }

    /// The request id, if a request-id unit set one.
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        self.state.get::<RequestId>(REQUEST_ID_KEY).copied()
    }

    /// Creates a `GET /` context for tests.
    #[must_use]
    pub fn mock() -> Self {
        Self::new(
            Method::Get,
            "/",
            QueryParams::new(),
            Headers::new(),
            Bytes::new(),
        )
    }
}

fn validate_target(target: &str) -> Result<(), MalformedRequestError> {
    if target.is_empty() || target.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Err(MalformedRequestError::InvalidTarget(target.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_splits_target() {
        let ctx = RequestContext::from_raw(RawRequest::new("DELETE", "/items/7?force=true"))
            .unwrap();
        assert_eq!(ctx.method(), Method::Delete);
        assert_eq!(ctx.path(), "/items/7");
        assert_eq!(ctx.query().get("force"), Some("true"));
    }

    #[test]
    fn test_from_raw_without_query() {
        let ctx = RequestContext::from_raw(RawRequest::new("GET", "/health")).unwrap();
        assert_eq!(ctx.path(), "/health");
        assert!(ctx.query().is_empty());
    }

    #[test]
    fn test_options_asterisk_form() {
        let ctx = RequestContext::from_raw(RawRequest::new("OPTIONS", "*")).unwrap();
        assert_eq!(ctx.path(), "*");
    }

    #[test]
    fn test_rejects_unknown_method() {
        let err = RequestContext::from_raw(RawRequest::new("BREW", "/pot")).unwrap_err();
        assert_eq!(err, MalformedRequestError::UnknownMethod("BREW".to_string()));
    }

    #[test]
    fn test_rejects_bad_targets() {
        for target in ["", "/a b", "/tab\there", "relative/path"] {
            let err = RequestContext::from_raw(RawRequest::new("GET", target)).unwrap_err();
            assert!(
                matches!(err, MalformedRequestError::InvalidTarget(_)),
                "target {target:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_rejects_control_char_in_header_name() {
        let raw = RawRequest::new("GET", "/").header("x-\u{1}bad", "v");
        let err = RequestContext::from_raw(raw).unwrap_err();
        assert!(matches!(err, MalformedRequestError::InvalidHeaderName(_)));
    }

    #[test]
    fn test_body_is_shared_not_copied() {
        let body = Bytes::from(vec![1_u8; 1024]);
        let ptr = body.as_ptr();
        let ctx = RequestContext::from_raw(RawRequest::new("POST", "/upload").body(body)).unwrap();
        assert_eq!(ctx.body().as_ptr(), ptr);
        assert_eq!(ctx.body().clone().as_ptr(), ptr);
    }

    #[test]
    fn test_state_helpers() {
        let mut ctx = RequestContext::mock();
        assert!(ctx.identity().is_none());
        assert!(ctx.request_id().is_none());

        let id = RequestId::new();
        ctx.state_mut().insert(REQUEST_ID_KEY, id);
        ctx.state_mut()
            .insert(IDENTITY_KEY, Identity::new("alice", "Bearer"));

        assert_eq!(ctx.request_id(), Some(id));
        assert_eq!(ctx.identity().map(|i| i.subject.as_str()), Some("alice"));
    }

    #[test]
    fn test_absent_state_read_twice() {
        let ctx = RequestContext::mock();
        assert!(ctx.state().get::<String>("nope").is_none());
        assert!(ctx.state().get::<String>("nope").is_none());
    }
}
