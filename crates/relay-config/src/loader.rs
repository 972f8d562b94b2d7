//! Layered configuration loading.
//!
//! Layers are applied in call order. File and string layers are deep-merged
//! over what came before, so a file only needs the keys it changes.
//! Environment overrides are applied last, when [`ConfigLoader::load`] runs.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde_json::Value;

use crate::{ConfigError, RateLimitKey, RelayConfig};
use relay_telemetry::LogFormat;

/// Builds a [`RelayConfig`] from defaults, files and environment variables.
///
/// # Example
///
/// ```no_run
/// use relay_config::ConfigLoader;
///
/// # fn main() -> Result<(), relay_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_production()
///     .with_file("relay.toml")?
///     .with_env_prefix("RELAY")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: RelayConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader starting from [`RelayConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RelayConfig::default(),
            env_prefix: None,
        }
    }

    /// Resets to default values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = RelayConfig::default();
        self
    }

    /// Resets to the development preset.
    ///
    /// ```
    /// use relay_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = RelayConfig::development();
        self
    }

    /// Resets to the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = RelayConfig::production();
        self
    }

    /// Merges a `.toml` or `.json` file over the current configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, has an
    /// unsupported extension, or contains invalid or unknown fields.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;

        self.with_string(&content, format)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Merges configuration text in the given format (`"toml"` or `"json"`).
    ///
    /// ```
    /// use relay_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[rate_limit]\nenabled = true\nlimit = 5", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.rate_limit.limit, 5);
    /// assert_eq!(config.rate_limit.window_secs, 60);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not parse or names unknown fields.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer: Value = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        let mut merged = serde_json::to_value(&self.config)?;
        merge(&mut merged, layer);
        self.config = serde_json::from_value(merged)?;
        Ok(self)
    }

    /// Enables `PREFIX__SECTION__KEY` environment overrides.
    ///
    /// For example, with prefix `RELAY`:
    /// - `RELAY__RATE_LIMIT__LIMIT=50`
    /// - `RELAY__CORS__ALLOWED_ORIGINS=https://a.example,https://b.example`
    ///
    /// List values are comma separated. Optional numbers accept `none`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Loads `.env` from the working directory or its parents, if present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Dotenv`] if a file is found but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::Dotenv(e.to_string())),
        }
    }

    /// Loads variables from a specific env file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Dotenv`] if the file is missing or malformed.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref()).map_err(|e| ConfigError::Dotenv(e.to_string()))?;
        Ok(self)
    }

    /// Applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns an error if an override does not parse or the result is invalid.
    pub fn load(mut self) -> Result<RelayConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars: BTreeMap<String, String> = env::vars()
                .filter(|(k, _)| k.starts_with(&prefix))
                .collect();
            for (key, value) in &vars {
                self.apply_env_var(key, value, &prefix)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> RelayConfig {
        self.config
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            return Ok(());
        };
        let parts: Vec<&str> = rest.split("__").collect();
        let c = &mut self.config;

        match parts.as_slice() {
            ["DISPATCHER", "REQUEST_TIMEOUT_MS"] => {
                c.dispatcher.request_timeout_ms = parse_optional(key, value)?;
            }
            ["DISPATCHER", "MAX_IN_FLIGHT"] => {
                c.dispatcher.max_in_flight = parse_optional(key, value)?;
            }

            ["LOGGING", "ENABLED"] => c.logging.enabled = bool_var(key, value)?,
            ["LOGGING", "LEVEL"] => c.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                c.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }

            ["METRICS", "ENABLED"] => c.metrics.enabled = bool_var(key, value)?,

            ["REQUEST_ID", "ENABLED"] => c.request_id.enabled = bool_var(key, value)?,
            ["REQUEST_ID", "TRUST_INCOMING"] => {
                c.request_id.trust_incoming = bool_var(key, value)?;
            }

            ["CORS", "ENABLED"] => c.cors.enabled = bool_var(key, value)?,
            ["CORS", "ALLOWED_ORIGINS"] => c.cors.allowed_origins = parse_list(value),
            ["CORS", "ALLOWED_METHODS"] => c.cors.allowed_methods = parse_list(value),
            ["CORS", "ALLOWED_HEADERS"] => c.cors.allowed_headers = parse_list(value),
            ["CORS", "EXPOSE_HEADERS"] => c.cors.expose_headers = parse_list(value),
            ["CORS", "ALLOW_CREDENTIALS"] => c.cors.allow_credentials = bool_var(key, value)?,
            ["CORS", "MAX_AGE_SECS"] => c.cors.max_age_secs = parse_optional(key, value)?,

            ["RATE_LIMIT", "ENABLED"] => c.rate_limit.enabled = bool_var(key, value)?,
            ["RATE_LIMIT", "LIMIT"] => c.rate_limit.limit = parse_number(key, value)?,
            ["RATE_LIMIT", "WINDOW_SECS"] => c.rate_limit.window_secs = parse_number(key, value)?,
            ["RATE_LIMIT", "KEY"] => {
                c.rate_limit.key = match value.to_lowercase().as_str() {
                    "header" => RateLimitKey::Header,
                    "identity" => RateLimitKey::Identity,
                    "global" => RateLimitKey::Global,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'header', 'identity', or 'global'",
                        ))
                    }
                };
            }
            ["RATE_LIMIT", "KEY_HEADER"] => c.rate_limit.key_header = value.to_lowercase(),

            ["AUTH", "ENABLED"] => c.auth.enabled = bool_var(key, value)?,
            ["AUTH", "HEADER"] => c.auth.header = value.to_lowercase(),
            ["AUTH", "SCHEME"] => c.auth.scheme = value.to_string(),
            ["AUTH", "SKIP_PATHS"] => c.auth.skip_paths = parse_list(value),

            ["ERROR_BOUNDARY", "EXPOSE_ERRORS"] => {
                c.error_boundary.expose_errors = bool_var(key, value)?;
            }
            ["ERROR_BOUNDARY", "MESSAGE"] => c.error_boundary.message = value.to_string(),

            // Tokens are only read from files.
            _ => {}
        }

        Ok(())
    }
}

/// Overlays `layer` onto `base`. Tables merge key by key, anything else replaces.
fn merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn bool_var(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_optional<T: FromStr>(key: &str, value: &str) -> Result<Option<T>, ConfigError> {
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer or 'none'"))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
