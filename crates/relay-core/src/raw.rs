//! Transport-level request and response shapes.
//!
//! An outer HTTP layer converts its own types to a [`RawRequest`] and receives
//! a [`RawResponse`]. Nothing here is validated: validation happens when a
//! [`RequestContext`](crate::RequestContext) is built.

use bytes::Bytes;
use http_body_util::Full;

/// An unvalidated inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRequest {
    /// Method token as received.
    pub method: String,

    /// Request target: path plus optional `?query`.
    pub target: String,

    /// Header pairs in arrival order.
    pub headers: Vec<(String, String)>,

    /// Body bytes.
    pub body: Bytes,
}

impl RawRequest {
    /// Creates a request with no headers and an empty body.
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Appends a header pair.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Converts an `http` request.
    ///
    /// Header values that are not valid UTF-8 are decoded lossily; the body
    /// of a `Full` is available without polling.
    pub async fn from_http(request: http::Request<Full<Bytes>>) -> Self {
        use http_body_util::BodyExt;

        let (parts, body) = request.into_parts();
        let target = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);
        let headers = parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };

        Self {
            method: parts.method.as_str().to_string(),
            target,
            headers,
            body,
        }
    }
}

/// An outbound response ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Status code.
    pub status: u16,

    /// Header pairs in emission order; duplicates allowed.
    pub headers: Vec<(String, String)>,

    /// Body bytes.
    pub body: Bytes,
}

impl RawResponse {
    /// Returns the first header value for `name`, ignoring ASCII case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the body as UTF-8 text, lossily.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Converts to an `http` response.
    ///
    /// Headers the `http` crate refuses are dropped with a warning; an
    /// out-of-range status becomes `500`.
    #[must_use]
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(self.body));
        *response.status_mut() = http::StatusCode::from_u16(self.status)
            .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);

        let headers = response.headers_mut();
        for (name, value) in self.headers {
            match (
                http::HeaderName::from_bytes(name.as_bytes()),
                http::HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::warn!(header = %name, "dropping header not representable in http types"),
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let raw = RawRequest::new("POST", "/items?x=1")
            .header("content-type", "application/json")
            .body("{}");
        assert_eq!(raw.method, "POST");
        assert_eq!(raw.headers.len(), 1);
        assert_eq!(raw.body, Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn test_from_http() {
        let request = http::Request::builder()
            .method("PUT")
            .uri("http://example.com/a/b?c=d")
            .header("X-Token", "t")
            .body(Full::new(Bytes::from_static(b"payload")))
            .unwrap();

        let raw = RawRequest::from_http(request).await;
        assert_eq!(raw.method, "PUT");
        assert_eq!(raw.target, "/a/b?c=d");
        assert_eq!(raw.headers, vec![("x-token".to_string(), "t".to_string())]);
        assert_eq!(raw.body, Bytes::from_static(b"payload"));
    }

    #[test]
    fn test_into_http_keeps_duplicate_headers() {
        let raw = RawResponse {
            status: 200,
            headers: vec![
                ("set-cookie".to_string(), "a=1".to_string()),
                ("set-cookie".to_string(), "b=2".to_string()),
            ],
            body: Bytes::from_static(b"ok"),
        };
        let response = raw.into_http();
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.headers().get_all("set-cookie").iter().count(), 2);
    }

    #[test]
    fn test_header_lookup_and_text() {
        let raw = RawResponse {
            status: 429,
            headers: vec![("Retry-After".to_string(), "30".to_string())],
            body: Bytes::from_static(b"slow down"),
        };
        assert_eq!(raw.header("retry-after"), Some("30"));
        assert_eq!(raw.text(), "slow down");
    }
}
