//! Test response wrapper.

use crate::error::TestError;
use bytes::Bytes;
use http::StatusCode;
use relay_core::RawResponse;
use serde::de::DeserializeOwned;

/// A response with helpers for assertions.
#[derive(Debug, Clone)]
pub struct TestResponse {
    raw: RawResponse,
}

impl From<RawResponse> for TestResponse {
    fn from(raw: RawResponse) -> Self {
        Self { raw }
    }
}

impl TestResponse {
    /// Status as a [`StatusCode`].
    #[must_use]
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.raw.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Status as a number.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.raw.status
    }

    /// 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }

    /// 4xx
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// 5xx
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }

    /// All header pairs in emission order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.raw.headers
    }

    /// First value of a header, ignoring ASCII case in the name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.raw.header(name)
    }

    /// Every value of a header, in order.
    #[must_use]
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.raw
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// `content-type`, if present.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Body bytes.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.raw.body
    }

    /// Body as UTF-8.
    pub fn text(&self) -> Result<String, TestError> {
        String::from_utf8(self.raw.body.to_vec())
            .map_err(|e| TestError::BodyRead(format!("invalid UTF-8: {e}")))
    }

    /// Body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TestError> {
        Ok(serde_json::from_slice(&self.raw.body)?)
    }

    /// Body as a JSON value.
    pub fn json_value(&self) -> Result<serde_json::Value, TestError> {
        self.json()
    }

    /// The `error.code` field of a JSON error envelope.
    #[must_use]
    pub fn error_code(&self) -> Option<String> {
        let value = self.json_value().ok()?;
        value["error"]["code"].as_str().map(String::from)
    }

    /// The underlying transport response.
    #[must_use]
    pub fn into_raw(self) -> RawResponse {
        self.raw
    }

    /// Asserts the status.
    ///
    /// # Panics
    ///
    /// Panics on mismatch.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status_code(),
            expected.as_u16(),
            "expected status {expected}, got {}; body: {}",
            self.raw.status,
            self.raw.text()
        );
        self
    }

    /// Asserts a 2xx status.
    ///
    /// # Panics
    ///
    /// Panics if the status is not 2xx.
    pub fn assert_success(&self) -> &Self {
        assert!(
            self.is_success(),
            "expected success status, got {}; body: {}",
            self.raw.status,
            self.raw.text()
        );
        self
    }

    /// Asserts a header's first value.
    ///
    /// # Panics
    ///
    /// Panics if the header is missing or differs.
    pub fn assert_header(&self, name: &str, expected: &str) -> &Self {
        let actual = self
            .header(name)
            .unwrap_or_else(|| panic!("header '{name}' not found"));
        assert_eq!(actual, expected, "header '{name}'");
        self
    }

    /// Asserts a header is absent.
    ///
    /// # Panics
    ///
    /// Panics if the header is present.
    pub fn assert_no_header(&self, name: &str) -> &Self {
        assert!(
            self.header(name).is_none(),
            "header '{name}' unexpectedly present: {:?}",
            self.header(name)
        );
        self
    }

    /// Asserts the error envelope code.
    ///
    /// # Panics
    ///
    /// Panics if the body is not an error envelope with that code.
    pub fn assert_error_code(&self, expected: &str) -> &Self {
        assert_eq!(
            self.error_code().as_deref(),
            Some(expected),
            "body: {}",
            self.raw.text()
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, headers: &[(&str, &str)], body: &'static str) -> TestResponse {
        TestResponse::from(RawResponse {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            body: Bytes::from_static(body.as_bytes()),
        })
    }

    #[test]
    fn test_status_helpers() {
        let ok = response(204, &[], "");
        assert!(ok.is_success());
        ok.assert_success().assert_status(StatusCode::NO_CONTENT);

        assert!(response(429, &[], "").is_client_error());
        assert!(response(503, &[], "").is_server_error());
    }

    #[test]
    fn test_headers() {
        let r = response(200, &[("Vary", "Origin"), ("vary", "Accept")], "");
        assert_eq!(r.header("VARY"), Some("Origin"));
        assert_eq!(r.header_all("vary"), ["Origin", "Accept"]);
        r.assert_header("vary", "Origin").assert_no_header("x-missing");
    }

    #[test]
    fn test_error_code() {
        let r = response(
            401,
            &[("content-type", "application/json")],
            r#"{"error":{"code":"UNAUTHORIZED","message":"missing credentials"}}"#,
        );
        assert_eq!(r.content_type(), Some("application/json"));
        r.assert_error_code("UNAUTHORIZED");
        assert_eq!(response(200, &[], "plain").error_code(), None);
    }

    #[test]
    fn test_text_and_json() {
        let r = response(200, &[], r#"{"n":1}"#);
        assert_eq!(r.text().unwrap(), r#"{"n":1}"#);
        assert_eq!(r.json_value().unwrap()["n"], 1);
        assert!(response(200, &[], "nope").json_value().is_err());
    }

    #[test]
    #[should_panic(expected = "expected status")]
    fn test_assert_status_panics() {
        response(500, &[], "boom").assert_status(StatusCode::OK);
    }
}
