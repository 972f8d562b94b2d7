//! CORS (Cross-Origin Resource Sharing) unit.
//!
//! Answers preflight requests directly and adds CORS headers to responses
//! for allowed origins.
//!
//! ## CORS Headers
//!
//! - `Access-Control-Allow-Origin`: Allowed origins
//! - `Access-Control-Allow-Methods`: Allowed HTTP methods
//! - `Access-Control-Allow-Headers`: Allowed request headers
//! - `Access-Control-Allow-Credentials`: Allow credentials
//! - `Access-Control-Max-Age`: Preflight cache duration
//! - `Access-Control-Expose-Headers`: Headers exposed to JavaScript
//!
//! ## Preflight Requests
//!
//! An `OPTIONS` request carrying both `Origin` and
//! `Access-Control-Request-Method` is a preflight. It never reaches later
//! units: the unit answers `204` when origin, method and headers are all
//! allowed and `403` otherwise.
//!
//! ## Example
//!
//! ```
//! use relay_core::Method;
//! use relay_middleware::stages::CorsUnit;
//! use std::time::Duration;
//!
//! let cors = CorsUnit::builder()
//!     .allow_origin("https://app.example.com")
//!     .allow_methods([Method::Get, Method::Post])
//!     .allow_headers(["Content-Type", "Authorization"])
//!     .allow_credentials(true)
//!     .max_age(Duration::from_secs(3600))
//!     .build();
//! assert!(cors.allowed_origins().is_allowed("https://app.example.com"));
//! ```

use crate::middleware::{Middleware, Next};
use http::StatusCode;
use relay_core::{BoxFuture, HandlerResult, Method, RequestContext, ResponseContext};
use relay_telemetry::metrics;
use std::collections::BTreeSet;
use std::time::Duration;

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Allow-Credentials` header.
    pub const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
    /// `Access-Control-Max-Age` header.
    pub const MAX_AGE: &str = "access-control-max-age";
    /// `Access-Control-Expose-Headers` header.
    pub const EXPOSE_HEADERS: &str = "access-control-expose-headers";
    /// `Access-Control-Request-Method` header (preflight).
    pub const REQUEST_METHOD: &str = "access-control-request-method";
    /// `Access-Control-Request-Headers` header (preflight).
    pub const REQUEST_HEADERS: &str = "access-control-request-headers";
    /// `Origin` header.
    pub const ORIGIN: &str = "origin";
    /// `Vary` header.
    pub const VARY: &str = "vary";
}

/// The set of allowed origins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// Any origin (wildcard `*`).
    Any,
    /// Exactly these origins.
    List(BTreeSet<String>),
}

impl AllowedOrigins {
    /// Checks if an origin is allowed.
    #[must_use]
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.contains(origin),
        }
    }

    /// Returns the `Access-Control-Allow-Origin` value for an allowed origin.
    #[must_use]
    pub fn header_value<'a>(&self, origin: &'a str) -> Option<&'a str> {
        match self {
            Self::Any => Some("*"),
            Self::List(origins) if origins.contains(origin) => Some(origin),
            Self::List(_) => None,
        }
    }
}

/// CORS unit configuration.
#[derive(Debug, Clone)]
struct CorsConfig {
    allowed_origins: AllowedOrigins,
    allowed_methods: Vec<Method>,
    allowed_headers: BTreeSet<String>,
    expose_headers: BTreeSet<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: AllowedOrigins::List(BTreeSet::new()),
            allowed_methods: vec![
                Method::Get,
                Method::Head,
                Method::Post,
                Method::Put,
                Method::Delete,
                Method::Patch,
            ],
            allowed_headers: ["content-type", "authorization", "x-request-id"]
                .into_iter()
                .map(String::from)
                .collect(),
            expose_headers: BTreeSet::new(),
            allow_credentials: false,
            max_age: Some(Duration::from_secs(86400)),
        }
    }
}

/// Builder for [`CorsUnit`].
#[derive(Debug, Clone, Default)]
pub struct CorsBuilder {
    config: CorsConfig,
}

impl CorsBuilder {
    /// Creates a builder that allows no origins yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows any origin (wildcard `*`).
    ///
    /// **Warning**: Browsers reject `Access-Control-Allow-Origin: *` combined
    /// with `Access-Control-Allow-Credentials: true`.
    #[must_use]
    pub fn allow_any_origin(mut self) -> Self {
        self.config.allowed_origins = AllowedOrigins::Any;
        self
    }

    /// Adds an allowed origin. Has no effect after `allow_any_origin`.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        if let AllowedOrigins::List(origins) = &mut self.config.allowed_origins {
            origins.insert(origin.into());
        }
        self
    }

    /// Replaces the allowed origins.
    #[must_use]
    pub fn allow_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_origins =
            AllowedOrigins::List(origins.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the allowed methods.
    #[must_use]
    pub fn allow_methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.config.allowed_methods.clear();
        for method in methods {
            if !self.config.allowed_methods.contains(&method) {
                self.config.allowed_methods.push(method);
            }
        }
        self
    }

    /// Adds an allowed request header.
    #[must_use]
    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.config
            .allowed_headers
            .insert(header.into().to_ascii_lowercase());
        self
    }

    /// Sets the allowed request headers. `"*"` allows any.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_headers = lowercase_set(headers);
        self
    }

    /// Sets headers exposed to JavaScript.
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.expose_headers = lowercase_set(headers);
        self
    }

    /// Sets whether credentials are allowed.
    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.config.allow_credentials = allow;
        self
    }

    /// Sets how long browsers may cache a preflight answer.
    #[must_use]
    pub fn max_age(mut self, duration: Duration) -> Self {
        self.config.max_age = Some(duration);
        self
    }

    /// Disables preflight caching.
    #[must_use]
    pub fn no_max_age(mut self) -> Self {
        self.config.max_age = None;
        self
    }

    /// Builds the unit.
    #[must_use]
    pub fn build(self) -> CorsUnit {
        CorsUnit {
            config: self.config,
        }
    }
}

fn lowercase_set<I, S>(items: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items
        .into_iter()
        .map(|h| h.into().to_ascii_lowercase())
        .collect()
}

/// Handles preflight requests and decorates responses with CORS headers.
///
/// Register it before authentication so preflights, which carry no
/// credentials, are answered without being rejected.
///
/// # Cancellation
///
/// Holds nothing across `next`.
#[derive(Debug, Clone)]
pub struct CorsUnit {
    config: CorsConfig,
}

impl CorsUnit {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> CorsBuilder {
        CorsBuilder::new()
    }

    /// Allows any origin, method and header.
    ///
    /// **Warning**: For development only.
    #[must_use]
    pub fn permissive() -> Self {
        CorsBuilder::new()
            .allow_any_origin()
            .allow_methods(Method::all())
            .allow_headers(["*"])
            .expose_headers(["*"])
            .build()
    }

    /// Returns the allowed origins.
    #[must_use]
    pub const fn allowed_origins(&self) -> &AllowedOrigins {
        &self.config.allowed_origins
    }

    /// Returns whether credentials are allowed.
    #[must_use]
    pub const fn allows_credentials(&self) -> bool {
        self.config.allow_credentials
    }

    fn is_preflight(ctx: &RequestContext) -> bool {
        ctx.method() == Method::Options
            && ctx.headers().contains(headers::ORIGIN)
            && ctx.headers().contains(headers::REQUEST_METHOD)
    }

    /// Validates a preflight; `Err` carries the rejection reason.
    fn check_preflight<'c>(&self, ctx: &'c RequestContext) -> Result<&'c str, String> {
        let origin = ctx.header(headers::ORIGIN).unwrap_or_default();
        if !self.config.allowed_origins.is_allowed(origin) {
            return Err("origin not allowed".to_string());
        }

        let requested = ctx.header(headers::REQUEST_METHOD).unwrap_or_default();
        let allowed = requested
            .trim()
            .parse::<Method>()
            .is_ok_and(|m| self.config.allowed_methods.contains(&m));
        if !allowed {
            return Err(format!("method '{}' not allowed", requested.trim()));
        }

        if let Some(requested_headers) = ctx.header(headers::REQUEST_HEADERS) {
            if !self.config.allowed_headers.contains("*") {
                for header in requested_headers
                    .split(',')
                    .map(|h| h.trim().to_ascii_lowercase())
                    .filter(|h| !h.is_empty())
                {
                    if !self.config.allowed_headers.contains(&header) {
                        return Err(format!("header '{header}' not allowed"));
                    }
                }
            }
        }

        Ok(origin)
    }

    fn preflight_response(&self, origin: &str) -> ResponseContext {
        let mut response = ResponseContext::empty(StatusCode::NO_CONTENT);
        let out = response.headers_mut();

        if let Some(value) = self.config.allowed_origins.header_value(origin) {
            out.insert(headers::ALLOW_ORIGIN, value);
        }
        let methods: Vec<_> = self
            .config
            .allowed_methods
            .iter()
            .map(|m| m.as_str())
            .collect();
        if !methods.is_empty() {
            out.insert(headers::ALLOW_METHODS, methods.join(", "));
        }
        if !self.config.allowed_headers.is_empty() {
            out.insert(headers::ALLOW_HEADERS, join(&self.config.allowed_headers));
        }
        if self.config.allow_credentials {
            out.insert(headers::ALLOW_CREDENTIALS, "true");
        }
        if let Some(max_age) = self.config.max_age {
            out.insert(headers::MAX_AGE, max_age.as_secs().to_string());
        }
        out.insert(
            headers::VARY,
            "Origin, Access-Control-Request-Method, Access-Control-Request-Headers",
        );
        response
    }

    fn add_cors_headers(&self, response: &mut ResponseContext, origin: &str) {
        let out = response.headers_mut();
        if let Some(value) = self.config.allowed_origins.header_value(origin) {
            out.insert(headers::ALLOW_ORIGIN, value);
        }
        if self.config.allow_credentials {
            out.insert(headers::ALLOW_CREDENTIALS, "true");
        }
        if !self.config.expose_headers.is_empty() {
            out.insert(headers::EXPOSE_HEADERS, join(&self.config.expose_headers));
        }
        out.append(headers::VARY, "Origin");
    }
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

impl Middleware for CorsUnit {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            if Self::is_preflight(ctx) {
                let response = match self.check_preflight(ctx) {
                    Ok(origin) => self.preflight_response(origin),
                    Err(reason) => {
                        tracing::debug!(reason = %reason, path = ctx.path(), "preflight rejected");
                        ResponseContext::json_error(
                            StatusCode::FORBIDDEN,
                            "CORS_FORBIDDEN",
                            &reason,
                            ctx.request_id(),
                        )
                    }
                };
                metrics::record_short_circuit(self.name(), response.status().as_u16());
                return Ok(response);
            }

            let origin = ctx.header(headers::ORIGIN).map(String::from);
            let mut response = next.run(ctx).await?;
            if let Some(origin) = origin {
                if self.config.allowed_origins.is_allowed(&origin) {
                    self.add_cors_headers(&mut response, &origin);
                }
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pipeline;
    use relay_core::{handler_fn, RawRequest};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn unit() -> CorsUnit {
        CorsUnit::builder()
            .allow_origin("https://app.example.com")
            .allow_methods([Method::Get, Method::Post])
            .allow_headers(["Content-Type", "Authorization"])
            .expose_headers(["X-Request-Id"])
            .build()
    }

    fn pipeline(unit: CorsUnit, calls: Arc<AtomicUsize>) -> Pipeline {
        Pipeline::builder()
            .register(unit)
            .terminal(handler_fn(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(ResponseContext::text(StatusCode::OK, "ok")) }
            }))
            .build()
            .unwrap()
    }

    fn preflight(origin: &str, method: &str, request_headers: Option<&str>) -> RequestContext {
        let mut raw = RawRequest::new("OPTIONS", "/orders")
            .header(headers::ORIGIN, origin)
            .header(headers::REQUEST_METHOD, method);
        if let Some(h) = request_headers {
            raw = raw.header(headers::REQUEST_HEADERS, h);
        }
        RequestContext::from_raw(raw).unwrap()
    }

    #[tokio::test]
    async fn test_preflight_allowed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline(unit(), Arc::clone(&calls));

        let mut ctx = preflight("https://app.example.com", "POST", Some("content-type"));
        let response = pipeline.execute(&mut ctx).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.header(headers::ALLOW_ORIGIN),
            Some("https://app.example.com")
        );
        assert_eq!(response.header(headers::ALLOW_METHODS), Some("GET, POST"));
        assert_eq!(
            response.header(headers::ALLOW_HEADERS),
            Some("authorization, content-type")
        );
        assert_eq!(response.header(headers::MAX_AGE), Some("86400"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_preflight_rejections() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline(unit(), Arc::clone(&calls));

        let cases = [
            preflight("https://evil.example.com", "GET", None),
            preflight("https://app.example.com", "DELETE", None),
            preflight("https://app.example.com", "GET", Some("x-custom")),
        ];
        for mut ctx in cases {
            let response = pipeline.execute(&mut ctx).await.unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert!(response.header(headers::ALLOW_ORIGIN).is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_simple_request_gets_headers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline(unit(), Arc::clone(&calls));

        let raw = RawRequest::new("GET", "/orders").header(headers::ORIGIN, "https://app.example.com");
        let mut ctx = RequestContext::from_raw(raw).unwrap();
        let response = pipeline.execute(&mut ctx).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.header(headers::ALLOW_ORIGIN),
            Some("https://app.example.com")
        );
        assert_eq!(response.header(headers::EXPOSE_HEADERS), Some("x-request-id"));
        assert_eq!(response.header(headers::VARY), Some("Origin"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disallowed_origin_passes_without_headers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline(unit(), Arc::clone(&calls));

        let raw = RawRequest::new("GET", "/").header(headers::ORIGIN, "https://evil.example.com");
        let mut ctx = RequestContext::from_raw(raw).unwrap();
        let response = pipeline.execute(&mut ctx).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.header(headers::ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn test_options_without_request_method_is_not_preflight() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline(unit(), Arc::clone(&calls));

        let raw = RawRequest::new("OPTIONS", "/").header(headers::ORIGIN, "https://app.example.com");
        let mut ctx = RequestContext::from_raw(raw).unwrap();
        pipeline.execute(&mut ctx).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permissive() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline(CorsUnit::permissive(), calls);

        let mut ctx = preflight("https://anything.test", "PATCH", Some("x-whatever"));
        let response = pipeline.execute(&mut ctx).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.header(headers::ALLOW_ORIGIN), Some("*"));
    }

    #[test]
    fn test_allowed_origins() {
        assert!(AllowedOrigins::Any.is_allowed("https://x.test"));
        assert_eq!(AllowedOrigins::Any.header_value("https://x.test"), Some("*"));

        let list = AllowedOrigins::List(BTreeSet::from(["https://a.test".to_string()]));
        assert!(list.is_allowed("https://a.test"));
        assert!(!list.is_allowed("https://b.test"));
        assert_eq!(list.header_value("https://b.test"), None);
    }

    #[test]
    fn test_builder() {
        let cors = CorsUnit::builder()
            .allow_any_origin()
            .allow_origin("https://ignored.test")
            .allow_credentials(true)
            .no_max_age()
            .build();
        assert_eq!(cors.allowed_origins(), &AllowedOrigins::Any);
        assert!(cors.allows_credentials());
        assert_eq!(cors.config.max_age, None);
        assert_eq!(cors.name(), "cors");
    }
}
