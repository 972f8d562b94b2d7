//! Credential check unit.
//!
//! Reads a credential from a designated header (by default
//! `Authorization: Bearer <token>`), validates it through a
//! [`TokenValidator`], and either stores the resulting [`Identity`] in request
//! state or answers `401 Unauthorized` without calling the rest of the chain.
//!
//! ## Responses
//!
//! | Situation | Outcome |
//! |-----------|---------|
//! | path matches a skip pattern | `next` called, no identity set |
//! | header missing, wrong scheme or empty token | `401`, `WWW-Authenticate: Bearer realm="..."` |
//! | validator rejects the token | `401`, `WWW-Authenticate: Bearer realm="...", error="invalid_token"` |
//! | validator fails | error propagated unchanged |
//! | token valid | `state["identity"]` set, `next` called |

use crate::middleware::{Middleware, Next};
use http::StatusCode;
use relay_core::{
    BoxFuture, HandlerError, HandlerResult, Identity, RequestContext, ResponseContext,
    IDENTITY_KEY,
};
use relay_telemetry::metrics;
use std::collections::HashMap;
use std::sync::Arc;

/// Default credential header.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// `WWW-Authenticate` challenge header.
pub const WWW_AUTHENTICATE: &str = "www-authenticate";

/// Default authentication scheme.
pub const BEARER: &str = "Bearer";

/// Resolves a token to an identity.
///
/// Validation may suspend, e.g. to call an introspection endpoint.
/// Return `Ok(None)` for an unknown or expired token and `Err` only when
/// validation itself could not be performed.
pub trait TokenValidator: Send + Sync + 'static {
    /// Validates `token`.
    fn validate<'a>(&'a self, token: &'a str)
        -> BoxFuture<'a, Result<Option<Identity>, HandlerError>>;
}

/// A fixed in-memory token table.
///
/// ```
/// use relay_middleware::stages::authentication::StaticTokens;
///
/// let tokens = StaticTokens::new()
///     .with_token("valid-token", "alice", ["orders:read"])
///     .with_token("ops-token", "ops", Vec::<String>::new());
/// assert_eq!(tokens.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, Identity>,
}

impl StaticTokens {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a token for `subject` with `scopes`.
    #[must_use]
    pub fn with_token<I, S>(mut self, token: impl Into<String>, subject: impl Into<String>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(token, Identity::new(subject, BEARER).with_scopes(scopes));
        self
    }

    /// Adds a token mapping to `identity`.
    pub fn insert(&mut self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }

    /// Number of known tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if no tokens are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenValidator for StaticTokens {
    fn validate<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<Option<Identity>, HandlerError>> {
        Box::pin(async move { Ok(self.tokens.get(token).cloned()) })
    }
}

/// Requires a valid credential before calling the rest of the chain.
///
/// # Cancellation
///
/// Holds no resources across `next`. A cancelled validation has no effect.
#[derive(Clone)]
pub struct AuthenticationUnit {
    validator: Arc<dyn TokenValidator>,
    header: String,
    scheme: String,
    realm: String,
    skip_paths: Vec<String>,
}

impl AuthenticationUnit {
    /// Creates a unit reading `Authorization: Bearer <token>`.
    pub fn new(validator: impl TokenValidator) -> Self {
        Self::with_shared_validator(Arc::new(validator))
    }

    /// Creates a unit over a shared validator.
    #[must_use]
    pub fn with_shared_validator(validator: Arc<dyn TokenValidator>) -> Self {
        Self {
            validator,
            header: AUTHORIZATION_HEADER.to_string(),
            scheme: BEARER.to_string(),
            realm: "relay".to_string(),
            skip_paths: Vec::new(),
        }
    }

    /// Reads the credential from `header` instead of `Authorization`.
    #[must_use]
    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    /// Expects `scheme` instead of `Bearer`. Compared case-insensitively.
    #[must_use]
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Sets the realm advertised in `WWW-Authenticate`.
    #[must_use]
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Lets requests to `path` through without credentials.
    ///
    /// A pattern ending in `*` matches any path with that prefix.
    #[must_use]
    pub fn skip_path(mut self, path: impl Into<String>) -> Self {
        self.skip_paths.push(path.into());
        self
    }

    fn is_skipped(&self, path: &str) -> bool {
        self.skip_paths.iter().any(|pattern| match pattern.strip_suffix('*') {
            Some(prefix) => path.starts_with(prefix),
            None => path == pattern,
        })
    }

    /// Extracts the token after the scheme, or `None` if absent or malformed.
    fn credential<'c>(&self, ctx: &'c RequestContext) -> Option<&'c str> {
        let value = ctx.header(&self.header)?.trim();
        let (scheme, token) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case(&self.scheme) {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    }

    fn unauthorized(&self, ctx: &RequestContext, message: &str, invalid_token: bool) -> ResponseContext {
        let challenge = if invalid_token {
            format!("{} realm=\"{}\", error=\"invalid_token\"", self.scheme, self.realm)
        } else {
            format!("{} realm=\"{}\"", self.scheme, self.realm)
        };
        metrics::record_short_circuit("authentication", StatusCode::UNAUTHORIZED.as_u16());
        ResponseContext::json_error(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            message,
            ctx.request_id(),
        )
        .with_header(WWW_AUTHENTICATE, challenge)
    }
}

impl std::fmt::Debug for AuthenticationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationUnit")
            .field("header", &self.header)
            .field("scheme", &self.scheme)
            .field("skip_paths", &self.skip_paths)
            .finish_non_exhaustive()
    }
}

impl Middleware for AuthenticationUnit {
    fn name(&self) -> &'static str {
        "authentication"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            if self.is_skipped(ctx.path()) {
                return next.run(ctx).await;
            }

            let Some(token) = self.credential(ctx) else {
                tracing::debug!(unit = "authentication", path = ctx.path(), "missing credentials");
                return Ok(self.unauthorized(ctx, "missing or malformed credentials", false));
            };

            let identity = self.validator.validate(token).await?;
            let Some(mut identity) = identity else {
                tracing::info!(unit = "authentication", path = ctx.path(), "rejected credentials");
                return Ok(self.unauthorized(ctx, "invalid credentials", true));
            };

            identity.scheme.clone_from(&self.scheme);
            tracing::debug!(unit = "authentication", subject = %identity.log_id(), "authenticated");
            ctx.state_mut().insert(IDENTITY_KEY, identity);

            next.run(ctx).await
        })
    }
}
