//! The standard pipeline, assembled from [`RelayConfig`].
//!
//! Units are registered outermost first:
//!
//! ```text
//! ErrorBoundary → RequestId → Logging → Timeout → CORS → ConcurrencyLimit
//!     → RateLimit → Authentication → terminal
//! ```
//!
//! Disabled sections are left out. With `rate_limit.key = "identity"` the
//! rate limit moves behind authentication so the subject is known when the
//! key is read.

use std::time::Duration;

use relay_config::{RateLimitKey, RelayConfig};
use relay_core::{Handler, Method};
use relay_middleware::stages::{
    AuthenticationUnit, ConcurrencyLimitUnit, CorsUnit, ErrorBoundaryUnit, LoggingUnit,
    RateLimitUnit, RequestIdUnit, StaticTokens, TimeoutUnit,
};
use relay_middleware::{Dispatcher, Pipeline, PipelineBuilder};
use relay_telemetry::{LogConfig, LogFormat, MetricsConfig, TelemetryConfig};

use crate::Result;

/// Validates `config` and registers the units it enables.
///
/// The returned builder has no terminal yet; more units may be appended
/// innermost before it is finished.
pub fn pipeline_builder(config: &RelayConfig) -> Result<PipelineBuilder> {
    config.validate()?;

    let rate_limit = config.rate_limit.enabled.then(|| rate_limit_unit(config));
    let identity_keyed = config.rate_limit.key == RateLimitKey::Identity;
    let (outer_limit, inner_limit) = if identity_keyed {
        (None, rate_limit)
    } else {
        (rate_limit, None)
    };

    let builder = Pipeline::builder()
        .register(
            ErrorBoundaryUnit::new()
                .expose_errors(config.error_boundary.expose_errors)
                .message(config.error_boundary.message.clone()),
        )
        .register_optional(
            config
                .request_id
                .enabled
                .then(|| RequestIdUnit::with_trust(config.request_id.trust_incoming)),
        )
        .register_optional(config.logging.enabled.then(LoggingUnit::new))
        .register_optional(config.dispatcher.request_timeout_ms.map(TimeoutUnit::from_millis))
        .register_optional(config.cors.enabled.then(|| cors_unit(config)))
        .register_optional(config.dispatcher.max_in_flight.map(ConcurrencyLimitUnit::new))
        .register_optional(outer_limit)
        .register_optional(config.auth.enabled.then(|| auth_unit(config)))
        .register_optional(inner_limit);

    tracing::debug!(stages = builder.stage_count(), "standard pipeline configured");
    Ok(builder)
}

/// Builds the standard pipeline around `terminal`.
///
/// ```
/// use relay::config::RelayConfig;
/// use relay::core::{handler_fn, ResponseContext};
///
/// let mut config = RelayConfig::default();
/// config.rate_limit.enabled = true;
///
/// let pipeline = relay::pipeline_from_config(
///     &config,
///     handler_fn(|_| async { Ok(ResponseContext::text(http::StatusCode::OK, "ok")) }),
/// )
/// .unwrap();
///
/// assert_eq!(
///     pipeline.stage_names(),
///     ["error_boundary", "request_id", "logging", "rate_limit"]
/// );
/// ```
pub fn pipeline_from_config<H: Handler>(config: &RelayConfig, terminal: H) -> Result<Pipeline> {
    Ok(pipeline_builder(config)?.terminal(terminal).build()?)
}

/// Builds a [`Dispatcher`] over the standard pipeline.
pub fn dispatcher_from_config<H: Handler>(config: &RelayConfig, terminal: H) -> Result<Dispatcher> {
    pipeline_from_config(config, terminal).map(Dispatcher::new)
}

/// Maps the `logging` and `metrics` sections onto telemetry settings.
#[must_use]
pub fn telemetry_config(config: &RelayConfig) -> TelemetryConfig {
    let base = match config.logging.format {
        LogFormat::Pretty => LogConfig::development(),
        LogFormat::Json => LogConfig::production(),
    };
    TelemetryConfig {
        logging: LogConfig {
            enabled: config.logging.enabled,
            level: config.logging.level.clone(),
            format: config.logging.format,
            ..base
        },
        metrics: MetricsConfig {
            enabled: config.metrics.enabled,
            ..MetricsConfig::default()
        },
    }
}

/// Installs the global subscriber and metrics recorder described by `config`.
///
/// Call once at startup, before serving requests.
pub fn init_telemetry(config: &RelayConfig) -> Result<()> {
    relay_telemetry::init_telemetry(&telemetry_config(config))?;
    Ok(())
}

fn cors_unit(config: &RelayConfig) -> CorsUnit {
    let cors = &config.cors;
    let builder = if cors.allows_any_origin() {
        CorsUnit::builder().allow_any_origin()
    } else {
        CorsUnit::builder().allow_origins(cors.allowed_origins.iter().cloned())
    };
    let builder = builder
        .allow_methods(cors.allowed_methods.iter().filter_map(|m| m.parse::<Method>().ok()))
        .allow_headers(cors.allowed_headers.iter().cloned())
        .expose_headers(cors.expose_headers.iter().cloned())
        .allow_credentials(cors.allow_credentials);
    let builder = match cors.max_age_secs {
        Some(secs) => builder.max_age(Duration::from_secs(secs)),
        None => builder.no_max_age(),
    };
    builder.build()
}

fn rate_limit_unit(config: &RelayConfig) -> RateLimitUnit {
    let section = &config.rate_limit;
    let unit = RateLimitUnit::new(section.limit, Duration::from_secs(section.window_secs));
    match section.key {
        RateLimitKey::Header => unit.per_header(section.key_header.clone()),
        RateLimitKey::Identity => unit.per_identity(),
        RateLimitKey::Global => unit.global(),
    }
}

fn auth_unit(config: &RelayConfig) -> AuthenticationUnit {
    let section = &config.auth;
    let tokens = section
        .tokens
        .iter()
        .fold(StaticTokens::new(), |tokens, (token, grant)| {
            tokens.with_token(token.clone(), grant.subject.clone(), grant.scopes.clone())
        });
    section.skip_paths.iter().fold(
        AuthenticationUnit::new(tokens)
            .header(section.header.clone())
            .scheme(section.scheme.clone()),
        |unit, path| unit.skip_path(path.clone()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use relay_core::{handler_fn, ResponseContext};

    fn ok() -> impl Handler {
        handler_fn(|_| async { Ok(ResponseContext::new(StatusCode::OK)) })
    }

    fn names(config: &RelayConfig) -> Vec<&'static str> {
        pipeline_from_config(config, ok()).unwrap().stage_names()
    }

    #[test]
    fn test_default_stages() {
        assert_eq!(
            names(&RelayConfig::default()),
            ["error_boundary", "request_id", "logging"]
        );
    }

    #[test]
    fn test_everything_enabled_in_order() {
        let mut config = RelayConfig::default();
        config.dispatcher.request_timeout_ms = Some(1000);
        config.dispatcher.max_in_flight = Some(8);
        config.cors.enabled = true;
        config.rate_limit.enabled = true;
        config.auth.enabled = true;

        assert_eq!(
            names(&config),
            [
                "error_boundary",
                "request_id",
                "logging",
                "timeout",
                "cors",
                "concurrency_limit",
                "rate_limit",
                "authentication",
            ]
        );
    }

    #[test]
    fn test_identity_keyed_limit_follows_auth() {
        let mut config = RelayConfig::default();
        config.logging.enabled = false;
        config.request_id.enabled = false;
        config.rate_limit.enabled = true;
        config.rate_limit.key = RateLimitKey::Identity;
        config.auth.enabled = true;

        assert_eq!(
            names(&config),
            ["error_boundary", "authentication", "rate_limit"]
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = RelayConfig::default();
        config.rate_limit.limit = 0;
        assert!(matches!(
            pipeline_from_config(&config, ok()),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn test_telemetry_mapping() {
        let telemetry = telemetry_config(&RelayConfig::development());
        assert_eq!(telemetry.logging.format, LogFormat::Pretty);
        assert_eq!(telemetry.logging.level, "debug");
        assert!(telemetry.logging.file_line_info);

        let mut config = RelayConfig::production();
        config.metrics.enabled = false;
        let telemetry = telemetry_config(&config);
        assert_eq!(telemetry.logging.format, LogFormat::Json);
        assert!(!telemetry.metrics.enabled);
    }
}
