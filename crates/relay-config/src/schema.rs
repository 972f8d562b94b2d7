//! Configuration schema types.
//!
//! One struct per section of the configuration file. Every section rejects
//! unknown fields and every field has a default.

use relay_telemetry::LogFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dispatcher-wide limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Per-request deadline in milliseconds. `None` disables the timeout unit.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,

    /// Maximum requests in flight. `None` disables the concurrency unit.
    #[serde(default)]
    pub max_in_flight: Option<usize>,
}

/// Logging configuration.
///
/// Controls both the `tracing` subscriber and the access-log unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging and register the access-log unit.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive, e.g. `"info"` or `"relay=debug,info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::Json,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Request id unit configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RequestIdConfig {
    /// Register the request id unit.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Reuse a valid incoming `x-request-id`.
    #[serde(default)]
    pub trust_incoming: bool,
}

impl Default for RequestIdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trust_incoming: false,
        }
    }
}

/// CORS unit configuration.
///
/// # Example
///
/// ```toml
/// [cors]
/// enabled = true
/// allowed_origins = ["https://app.example.com"]
/// allow_credentials = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CorsConfig {
    /// Register the CORS unit.
    #[serde(default)]
    pub enabled: bool,

    /// Allowed origins. `"*"` allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Allowed methods.
    #[serde(default = "default_cors_methods")]
    pub allowed_methods: Vec<String>,

    /// Allowed request headers.
    #[serde(default = "default_cors_headers")]
    pub allowed_headers: Vec<String>,

    /// Response headers exposed to scripts.
    #[serde(default)]
    pub expose_headers: Vec<String>,

    /// Allow cookies and authorization headers.
    #[serde(default)]
    pub allow_credentials: bool,

    /// Preflight cache lifetime. `None` omits `Access-Control-Max-Age`.
    #[serde(default = "default_max_age")]
    pub max_age_secs: Option<u64>,
}

impl CorsConfig {
    /// Returns true if any origin is allowed.
    #[must_use]
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: Vec::new(),
            allowed_methods: default_cors_methods(),
            allowed_headers: default_cors_headers(),
            expose_headers: Vec::new(),
            allow_credentials: false,
            max_age_secs: default_max_age(),
        }
    }
}

fn default_cors_methods() -> Vec<String> {
    ["GET", "HEAD", "POST", "PUT", "DELETE", "PATCH"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_cors_headers() -> Vec<String> {
    ["content-type", "authorization", "x-request-id"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[allow(clippy::unnecessary_wraps)]
fn default_max_age() -> Option<u64> {
    Some(86400)
}

/// Where the rate limit key comes from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitKey {
    /// A request header, see [`RateLimitConfig::key_header`].
    #[default]
    Header,
    /// The authenticated subject.
    Identity,
    /// One bucket for all requests.
    Global,
}

/// Rate limit unit configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Register the rate limit unit.
    #[serde(default)]
    pub enabled: bool,

    /// Requests admitted per window and key.
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Key source.
    #[serde(default)]
    pub key: RateLimitKey,

    /// Header used when `key = "header"`.
    #[serde(default = "default_key_header")]
    pub key_header: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: default_limit(),
            window_secs: default_window_secs(),
            key: RateLimitKey::Header,
            key_header: default_key_header(),
        }
    }
}

fn default_limit() -> u64 {
    100
}

fn default_window_secs() -> u64 {
    60
}

fn default_key_header() -> String {
    "x-client-id".to_string()
}

/// Identity granted to a configured token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    /// Subject of the identity.
    pub subject: String,

    /// Scopes of the identity.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Authentication unit configuration.
///
/// # Example
///
/// ```toml
/// [auth]
/// enabled = true
/// skip_paths = ["/health", "/public/*"]
///
/// [auth.tokens.dev-token]
/// subject = "alice"
/// scopes = ["orders:read"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Register the authentication unit.
    #[serde(default)]
    pub enabled: bool,

    /// Header carrying the credential.
    #[serde(default = "default_auth_header")]
    pub header: String,

    /// Expected scheme prefix.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Accepted tokens.
    #[serde(default)]
    pub tokens: BTreeMap<String, TokenConfig>,

    /// Paths that skip authentication. A trailing `*` matches a prefix.
    #[serde(default)]
    pub skip_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            header: default_auth_header(),
            scheme: default_scheme(),
            tokens: BTreeMap::new(),
            skip_paths: Vec::new(),
        }
    }
}

fn default_auth_header() -> String {
    "authorization".to_string()
}

fn default_scheme() -> String {
    "Bearer".to_string()
}

/// Error boundary configuration.
///
/// The boundary is always registered as the outermost unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ErrorBoundaryConfig {
    /// Put error text in 500 responses. Development only.
    #[serde(default)]
    pub expose_errors: bool,

    /// Generic 500 message.
    #[serde(default = "default_error_message")]
    pub message: String,
}

impl Default for ErrorBoundaryConfig {
    fn default() -> Self {
        Self {
            expose_errors: false,
            message: default_error_message(),
        }
    }
}

fn default_error_message() -> String {
    "internal server error".to_string()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_defaults() {
        assert!(LoggingConfig::default().enabled);
        assert_eq!(RateLimitConfig::default().limit, 100);
        assert_eq!(RateLimitConfig::default().key_header, "x-client-id");
        assert_eq!(AuthConfig::default().scheme, "Bearer");
        assert_eq!(CorsConfig::default().max_age_secs, Some(86400));
        assert!(!CorsConfig::default().allows_any_origin());
    }

    #[test]
    fn test_empty_section_uses_defaults() {
        let config: RateLimitConfig = toml::from_str("").unwrap();
        assert_eq!(config, RateLimitConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<RateLimitConfig, _> = toml::from_str("limti = 5");
        assert!(result.is_err());
    }

    #[test]
    fn test_rate_limit_key_names() {
        let config: RateLimitConfig = toml::from_str(r#"key = "identity""#).unwrap();
        assert_eq!(config.key, RateLimitKey::Identity);
    }

    #[test]
    fn test_tokens_table() {
        let config: AuthConfig = toml::from_str(
            r#"
            [tokens.abc]
            subject = "alice"
            scopes = ["read"]
            "#,
        )
        .unwrap();
        assert_eq!(config.tokens["abc"].subject, "alice");
        assert_eq!(config.tokens["abc"].scopes, ["read"]);
    }
}
