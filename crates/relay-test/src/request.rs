//! Test request building.

use crate::error::TestError;
use bytes::Bytes;
use relay_core::{Method, RawRequest};
use serde::Serialize;

/// Fluent builder for a [`RawRequest`].
///
/// Encoding failures from [`json`](Self::json), [`form`](Self::form) or
/// [`query`](Self::query) are held until [`build`](Self::build).
///
/// ```
/// use relay_test::TestRequest;
///
/// let raw = TestRequest::get("/orders")
///     .query(&[("page", "2")])
///     .bearer_token("abc")
///     .build()
///     .unwrap();
///
/// assert_eq!(raw.target, "/orders?page=2");
/// assert_eq!(raw.headers[0], ("authorization".to_string(), "Bearer abc".to_string()));
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub struct TestRequest {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
    body: Bytes,
    error: Option<String>,
}

impl TestRequest {
    /// Starts a request with any method token, valid or not.
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            error: None,
        }
    }

    /// Starts a request with a known method.
    pub fn method(method: Method, target: impl Into<String>) -> Self {
        Self::new(method.as_str(), target)
    }

    /// `GET`
    pub fn get(target: impl Into<String>) -> Self {
        Self::method(Method::Get, target)
    }

    /// `POST`
    pub fn post(target: impl Into<String>) -> Self {
        Self::method(Method::Post, target)
    }

    /// `PUT`
    pub fn put(target: impl Into<String>) -> Self {
        Self::method(Method::Put, target)
    }

    /// `PATCH`
    pub fn patch(target: impl Into<String>) -> Self {
        Self::method(Method::Patch, target)
    }

    /// `DELETE`
    pub fn delete(target: impl Into<String>) -> Self {
        Self::method(Method::Delete, target)
    }

    /// `OPTIONS`
    pub fn options(target: impl Into<String>) -> Self {
        Self::method(Method::Options, target)
    }

    /// `HEAD`
    pub fn head(target: impl Into<String>) -> Self {
        Self::method(Method::Head, target)
    }

    /// Appends a header. Repeated names are kept in order.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets `content-type`.
    pub fn content_type(self, content_type: impl Into<String>) -> Self {
        self.header("content-type", content_type)
    }

    /// Sets `accept`.
    pub fn accept(self, accept: impl Into<String>) -> Self {
        self.header("accept", accept)
    }

    /// Sets `authorization: Bearer <token>`.
    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.header("authorization", format!("Bearer {}", token.as_ref()))
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and `content-type: application/json`.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.body = Bytes::from(bytes),
            Err(e) => self.error = Some(format!("JSON body: {e}")),
        }
        self.content_type("application/json")
    }

    /// Sets a form body and `content-type: application/x-www-form-urlencoded`.
    pub fn form<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_urlencoded::to_string(value) {
            Ok(encoded) => self.body = Bytes::from(encoded),
            Err(e) => self.error = Some(format!("form body: {e}")),
        }
        self.content_type("application/x-www-form-urlencoded")
    }

    /// Appends url-encoded query parameters to the target.
    pub fn query<T: Serialize + ?Sized>(mut self, params: &T) -> Self {
        match serde_urlencoded::to_string(params) {
            Ok(encoded) if encoded.is_empty() => {}
            Ok(encoded) => {
                let sep = if self.target.contains('?') { '&' } else { '?' };
                self.target.push(sep);
                self.target.push_str(&encoded);
            }
            Err(e) => self.error = Some(format!("query: {e}")),
        }
        self
    }

    /// Finishes the request.
    ///
    /// The result is not validated; malformed methods and headers pass
    /// through so rejection paths can be tested.
    pub fn build(self) -> Result<RawRequest, TestError> {
        if let Some(error) = self.error {
            return Err(TestError::RequestBuild(error));
        }
        Ok(RawRequest {
            method: self.method,
            target: self.target,
            headers: self.headers,
            body: self.body,
        })
    }
}
