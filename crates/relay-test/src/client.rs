//! In-memory test client.

use crate::error::TestError;
use crate::request::TestRequest;
use crate::response::TestResponse;
use bytes::Bytes;
use http::StatusCode;
use relay_core::{handler_fn, Handler, Method, RawRequest, ResponseContext};
use relay_middleware::{Dispatcher, Pipeline};
use serde::Serialize;

/// Sends requests straight into a [`Dispatcher`], with no sockets involved.
///
/// Requests take the same path a transport would use: raw request in,
/// context building, the full pipeline, then status and header emission.
///
/// ```
/// use relay_core::{handler_fn, ResponseContext};
/// use relay_middleware::{stages::RequestIdUnit, Pipeline};
/// use relay_test::TestClient;
/// use http::StatusCode;
///
/// # tokio_test::block_on(async {
/// let pipeline = Pipeline::builder()
///     .register(RequestIdUnit::new())
///     .terminal(handler_fn(|_| async { Ok(ResponseContext::text(StatusCode::OK, "hi")) }))
///     .build()
///     .unwrap();
///
/// let client = TestClient::from_pipeline(pipeline);
/// let response = client.get("/").send().await;
///
/// response.assert_status(StatusCode::OK);
/// assert!(response.header("x-request-id").is_some());
/// # });
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub struct TestClient {
    dispatcher: Dispatcher,
    default_headers: Vec<(String, String)>,
}

impl TestClient {
    /// Wraps an existing dispatcher.
    pub const fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            default_headers: Vec::new(),
        }
    }

    /// Wraps a pipeline in a fresh dispatcher.
    pub fn from_pipeline(pipeline: Pipeline) -> Self {
        Self::new(Dispatcher::new(pipeline))
    }

    /// A client whose pipeline is only `handler`.
    pub fn from_handler<H: Handler>(handler: H) -> Self {
        let pipeline = Pipeline::build(Vec::new(), Some(std::sync::Arc::new(handler)));
        match pipeline {
            Ok(pipeline) => Self::from_pipeline(pipeline),
            Err(e) => unreachable!("terminal supplied: {e}"),
        }
    }

    /// A client answering every request with a JSON echo of what the
    /// terminal saw: method, path, query, body length, identity and request id.
    pub fn echo() -> Self {
        Self::from_handler(Self::echo_terminal())
    }

    /// The terminal behind [`echo`](Self::echo), for use in other pipelines.
    pub fn echo_terminal() -> impl Handler {
        handler_fn(|ctx| {
            let query: serde_json::Map<String, serde_json::Value> = ctx
                .query()
                .iter()
                .filter_map(|(k, v)| {
                    v.first()
                        .map(|first| (k.to_string(), serde_json::Value::String(first.clone())))
                })
                .collect();
            let body = serde_json::json!({
                "method": ctx.method().as_str(),
                "path": ctx.path(),
                "query": query,
                "body_len": ctx.body().len(),
                "identity": ctx.identity().map(|id| id.subject.clone()),
                "request_id": ctx.request_id().map(|id| id.to_string()),
            });
            async move { Ok(ResponseContext::json(StatusCode::OK, &body)) }
        })
    }

    /// A client answering every request with the same status and text.
    pub fn fixed_response(status: StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::from_handler(handler_fn(move |_| {
            let body = body.clone();
            async move { Ok(ResponseContext::text(status, body)) }
        }))
    }

    /// Adds a header sent with every request.
    pub fn with_default_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// The dispatcher requests go through.
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// `GET`
    pub fn get(&self, target: impl Into<String>) -> TestClientRequest<'_> {
        self.request(Method::Get, target)
    }

    /// `POST`
    pub fn post(&self, target: impl Into<String>) -> TestClientRequest<'_> {
        self.request(Method::Post, target)
    }

    /// `PUT`
    pub fn put(&self, target: impl Into<String>) -> TestClientRequest<'_> {
        self.request(Method::Put, target)
    }

    /// `PATCH`
    pub fn patch(&self, target: impl Into<String>) -> TestClientRequest<'_> {
        self.request(Method::Patch, target)
    }

    /// `DELETE`
    pub fn delete(&self, target: impl Into<String>) -> TestClientRequest<'_> {
        self.request(Method::Delete, target)
    }

    /// `OPTIONS`
    pub fn options(&self, target: impl Into<String>) -> TestClientRequest<'_> {
        self.request(Method::Options, target)
    }

    /// `HEAD`
    pub fn head(&self, target: impl Into<String>) -> TestClientRequest<'_> {
        self.request(Method::Head, target)
    }

    /// A request with a known method.
    pub fn request(&self, method: Method, target: impl Into<String>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::method(method, target))
    }

    /// A request with any method token, including invalid ones.
    pub fn raw_method(
        &self,
        method: impl Into<String>,
        target: impl Into<String>,
    ) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::new(method, target))
    }

    /// Sends an already-built request.
    pub async fn send_raw(&self, raw: RawRequest) -> TestResponse {
        TestResponse::from(self.dispatcher.handle(raw).await)
    }
}

/// A request bound to a [`TestClient`].
#[must_use]
#[derive(Debug)]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    request: TestRequest,
}

impl<'a> TestClientRequest<'a> {
    fn new(client: &'a TestClient, request: TestRequest) -> Self {
        let request = client
            .default_headers
            .iter()
            .fold(request, |req, (name, value)| req.header(name, value));
        Self { client, request }
    }

    /// Appends a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request = self.request.header(name, value);
        self
    }

    /// Sets `content-type`.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.request = self.request.content_type(content_type);
        self
    }

    /// Sets a bearer token.
    pub fn bearer_token(mut self, token: impl AsRef<str>) -> Self {
        self.request = self.request.bearer_token(token);
        self
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request = self.request.body(body);
        self
    }

    /// Sets a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.request = self.request.json(value);
        self
    }

    /// Sets a form body.
    pub fn form<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.request = self.request.form(value);
        self
    }

    /// Appends query parameters.
    pub fn query<T: Serialize + ?Sized>(mut self, params: &T) -> Self {
        self.request = self.request.query(params);
        self
    }

    /// Sends the request.
    ///
    /// # Panics
    ///
    /// Panics if a body or query failed to encode; use
    /// [`try_send`](Self::try_send) to get the error instead.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(e) => panic!("test request could not be built: {e}"),
        }
    }

    /// Sends the request, returning build errors.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        let raw = self.request.build()?;
        Ok(self.client.send_raw(raw).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::HandlerError;
    use serde_json::json;

    #[tokio::test]
    async fn test_echo_client() {
        let client = TestClient::echo();
        let response = client.get("/test/path").query(&[("a", "1")]).send().await;

        response.assert_status(StatusCode::OK);
        let body = response.json_value().unwrap();
        assert_eq!(body["method"], "GET");
        assert_eq!(body["path"], "/test/path");
        assert_eq!(body["query"]["a"], "1");
        assert_eq!(body["identity"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_fixed_response() {
        let client = TestClient::fixed_response(StatusCode::CREATED, "created");
        let response = client.post("/items").send().await;

        assert_eq!(response.status_code(), 201);
        assert_eq!(response.text().unwrap(), "created");
    }

    #[tokio::test]
    async fn test_default_headers() {
        let client = TestClient::from_handler(handler_fn(|ctx| {
            let custom = ctx.header("x-custom").unwrap_or("none").to_string();
            async move { Ok(ResponseContext::text(StatusCode::OK, custom)) }
        }))
        .with_default_header("X-Custom", "default-value");

        let response = client.get("/test").send().await;
        assert_eq!(response.text().unwrap(), "default-value");
    }

    #[tokio::test]
    async fn test_json_body_reaches_terminal() {
        let client = TestClient::echo();
        let response = client.post("/users").json(&json!({"name": "Alice"})).send().await;
        assert_eq!(response.json_value().unwrap()["body_len"], 16);
    }

    #[tokio::test]
    async fn test_all_methods() {
        let client = TestClient::echo();
        for method in [
            Method::Get,
            Method::Post,
            Method::Put,
            Method::Patch,
            Method::Delete,
            Method::Options,
            Method::Head,
        ] {
            let response = client.request(method, "/m").send().await;
            assert_eq!(response.json_value().unwrap()["method"], method.as_str());
        }
    }

    #[tokio::test]
    async fn test_malformed_method_is_400() {
        let client = TestClient::echo();
        client
            .raw_method("BREW", "/pot")
            .send()
            .await
            .assert_status(StatusCode::BAD_REQUEST)
            .assert_error_code("BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_handler_error_is_500() {
        let client =
            TestClient::from_handler(handler_fn(|_| async { Err(HandlerError::msg("db down")) }));
        let response = client.get("/").send().await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!response.text().unwrap().contains("db down"));
    }

    #[tokio::test]
    async fn test_try_send_reports_build_error() {
        let client = TestClient::echo();
        let result = client.post("/").form(&7).try_send().await;
        assert!(matches!(result, Err(TestError::RequestBuild(_))));
    }
}
