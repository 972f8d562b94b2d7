//! Request id unit.
//!
//! Assigns every request a [`RequestId`] and echoes it back in the
//! `x-request-id` response header, so clients can quote it when reporting
//! problems and logs can be correlated.
//!
//! ## Sources
//!
//! 1. The incoming `x-request-id` header, when trusted and a valid UUID
//! 2. A fresh UUID v7 otherwise
//!
//! The id is stored in request state under [`REQUEST_ID_KEY`] before the rest
//! of the chain runs. The response header is added on success only. A failing
//! chain leaves the error to whichever boundary converts it, and both
//! [`ErrorBoundaryUnit`](super::ErrorBoundaryUnit) and the dispatcher's own
//! `500` copy the id from state into the same header.

use crate::middleware::{Middleware, Next};
use relay_core::{BoxFuture, HandlerResult, RequestContext, RequestId, REQUEST_ID_KEY};

/// Header used to propagate request ids.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Assigns and propagates request ids.
///
/// # Cancellation
///
/// Holds no resources across `next`; dropping the future has no side effects.
#[derive(Debug, Clone, Default)]
pub struct RequestIdUnit {
    /// Whether an incoming `x-request-id` is reused.
    ///
    /// Should be `false` for traffic from untrusted clients.
    trust_incoming: bool,
}

impl RequestIdUnit {
    /// Creates a unit that always generates fresh ids.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a unit that reuses a valid incoming `x-request-id`.
    #[must_use]
    pub fn trust_incoming() -> Self {
        Self {
            trust_incoming: true,
        }
    }

    /// Creates a unit with explicit trust.
    #[must_use]
    pub const fn with_trust(trust_incoming: bool) -> Self {
        Self { trust_incoming }
    }

    fn resolve(&self, ctx: &RequestContext) -> RequestId {
        if !self.trust_incoming {
            return RequestId::new();
        }
        ctx.header(REQUEST_ID_HEADER)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or_else(RequestId::new)
    }
}

impl Middleware for RequestIdUnit {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let request_id = self.resolve(ctx);
            ctx.state_mut().insert(REQUEST_ID_KEY, request_id);

            let mut response = next.run(ctx).await?;
            response
                .headers_mut()
                .insert(REQUEST_ID_HEADER, request_id.to_string());
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pipeline;
    use http::StatusCode;
    use relay_core::{handler_fn, RawRequest, ResponseContext};

    fn pipeline(unit: RequestIdUnit) -> Pipeline {
        Pipeline::builder()
            .register(unit)
            .terminal(handler_fn(|ctx| {
                let seen = ctx.request_id().map(|id| id.to_string()).unwrap_or_default();
                async move { Ok(ResponseContext::text(StatusCode::OK, seen)) }
            }))
            .build()
            .unwrap()
    }

    fn ctx_with_id(id: &str) -> RequestContext {
        RequestContext::from_raw(RawRequest::new("GET", "/").header(REQUEST_ID_HEADER, id)).unwrap()
    }

    #[tokio::test]
    async fn test_generates_id_and_echoes_it() {
        let mut ctx = RequestContext::mock();
        let response = pipeline(RequestIdUnit::new()).execute(&mut ctx).await.unwrap();

        let header = response.header(REQUEST_ID_HEADER).unwrap().to_string();
        assert_eq!(ctx.request_id().unwrap().to_string(), header);
        assert_eq!(response.into_bytes().await, header.as_str());
    }

    #[tokio::test]
    async fn test_ignores_incoming_when_untrusted() {
        let incoming = "01234567-89ab-7def-8123-456789abcdef";
        let mut ctx = ctx_with_id(incoming);
        let response = pipeline(RequestIdUnit::new()).execute(&mut ctx).await.unwrap();
        assert_ne!(response.header(REQUEST_ID_HEADER), Some(incoming));
    }

    #[tokio::test]
    async fn test_uses_incoming_when_trusted() {
        let incoming = "01234567-89ab-7def-8123-456789abcdef";
        let mut ctx = ctx_with_id(incoming);
        let response = pipeline(RequestIdUnit::trust_incoming())
            .execute(&mut ctx)
            .await
            .unwrap();
        assert_eq!(response.header(REQUEST_ID_HEADER), Some(incoming));
    }

    #[tokio::test]
    async fn test_replaces_invalid_incoming() {
        let mut ctx = ctx_with_id("not-a-uuid");
        let response = pipeline(RequestIdUnit::trust_incoming())
            .execute(&mut ctx)
            .await
            .unwrap();
        let header = response.header(REQUEST_ID_HEADER).unwrap();
        assert_ne!(header, "not-a-uuid");
        assert!(header.parse::<RequestId>().is_ok());
    }

    #[test]
    fn test_name() {
        assert_eq!(RequestIdUnit::new().name(), "request_id");
        assert!(RequestIdUnit::with_trust(true).trust_incoming);
    }
}
