//! Top-level configuration type.

use serde::{Deserialize, Serialize};

use crate::{
    AuthConfig, ConfigError, CorsConfig, DispatcherConfig, ErrorBoundaryConfig, LoggingConfig,
    MetricsConfig, RateLimitConfig, RequestIdConfig,
};
use relay_core::headers::validate_name;
use relay_core::Method;
use relay_telemetry::LogFormat;

/// Complete Relay configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use relay_config::RelayConfig;
///
/// let config = RelayConfig::default();
/// assert!(config.request_id.enabled);
/// assert!(!config.rate_limit.enabled);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Dispatcher-wide limits.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Request id unit.
    #[serde(default)]
    pub request_id: RequestIdConfig,

    /// CORS unit.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Rate limit unit.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Authentication unit.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Error boundary.
    #[serde(default)]
    pub error_boundary: ErrorBoundaryConfig,
}

impl RelayConfig {
    /// Development preset: pretty `debug` logs and error text in 500s.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.request_id.trust_incoming = true;
        config.error_boundary.expose_errors = true;
        config
    }

    /// Production preset: JSON logs at `info`, no error detail.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config.error_boundary.expose_errors = false;
        config
    }

    /// Validates the configuration.
    ///
    /// Sections are checked whether or not they are enabled, so a disabled
    /// section can be switched on by an override without surprises.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatcher.request_timeout_ms == Some(0) {
            return Err(ConfigError::invalid_value(
                "dispatcher.request_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.dispatcher.max_in_flight == Some(0) {
            return Err(ConfigError::invalid_value(
                "dispatcher.max_in_flight",
                "must be greater than zero",
            ));
        }

        relay_telemetry::logging::create_env_filter(&self.logging.level)
            .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;

        if self.rate_limit.limit == 0 {
            return Err(ConfigError::invalid_value(
                "rate_limit.limit",
                "must be greater than zero",
            ));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::invalid_value(
                "rate_limit.window_secs",
                "must be greater than zero",
            ));
        }
        check_header("rate_limit.key_header", &self.rate_limit.key_header)?;

        check_header("auth.header", &self.auth.header)?;
        if self.auth.scheme.trim().is_empty() || self.auth.scheme.contains(' ') {
            return Err(ConfigError::invalid_value(
                "auth.scheme",
                "must be a single non-empty token",
            ));
        }
        if self.auth.tokens.keys().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::invalid_value("auth.tokens", "empty token"));
        }

        self.validate_cors()
    }

    fn validate_cors(&self) -> Result<(), ConfigError> {
        let cors = &self.cors;
        if cors.allow_credentials && cors.allows_any_origin() {
            return Err(ConfigError::invalid_value(
                "cors.allow_credentials",
                "cannot be combined with a \"*\" origin",
            ));
        }
        for method in &cors.allowed_methods {
            method
                .parse::<Method>()
                .map_err(|e| ConfigError::invalid_value("cors.allowed_methods", e.to_string()))?;
        }
        for header in &cors.allowed_headers {
            if header != "*" {
                check_header("cors.allowed_headers", header)?;
            }
        }
        for header in &cors.expose_headers {
            if header != "*" {
                check_header("cors.expose_headers", header)?;
            }
        }
        Ok(())
    }
}

fn check_header(field: &str, name: &str) -> Result<(), ConfigError> {
    validate_name(name).map_err(|e| ConfigError::invalid_value(field, e.to_string()))
}
