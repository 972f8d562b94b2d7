//! Loading configuration from files on disk.

use relay_config::{ConfigError, ConfigLoader, RateLimitKey};
use std::io::Write;
use tempfile::{Builder, NamedTempFile};

fn file_with(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn toml_file_is_loaded() {
    let file = file_with(
        ".toml",
        r#"
        [rate_limit]
        enabled = true
        limit = 5
        key = "identity"

        [auth]
        enabled = true
        skip_paths = ["/health"]

        [auth.tokens.abc123]
        subject = "alice"
        scopes = ["read"]
        "#,
    );

    let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();

    assert!(config.rate_limit.enabled);
    assert_eq!(config.rate_limit.limit, 5);
    assert_eq!(config.rate_limit.window_secs, 60);
    assert_eq!(config.rate_limit.key, RateLimitKey::Identity);
    assert_eq!(config.auth.tokens["abc123"].subject, "alice");
    assert_eq!(config.auth.skip_paths, ["/health"]);
}

#[test]
fn json_file_layers_over_toml_file() {
    let base = file_with(
        ".toml",
        "[cors]\nenabled = true\nallowed_origins = [\"https://a.example\"]\n",
    );
    let overlay = file_with(".json", r#"{"cors": {"max_age_secs": 60}}"#);

    let config = ConfigLoader::new()
        .with_file(base.path())
        .unwrap()
        .with_file(overlay.path())
        .unwrap()
        .load()
        .unwrap();

    assert!(config.cors.enabled);
    assert_eq!(config.cors.allowed_origins, ["https://a.example"]);
    assert_eq!(config.cors.max_age_secs, Some(60));
}

#[test]
fn unsupported_extension_is_rejected() {
    let file = file_with(".yaml", "rate_limit:\n  limit: 5\n");
    let result = ConfigLoader::new().with_file(file.path());
    assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
}

#[test]
fn unknown_field_in_file_is_rejected() {
    let file = file_with(".toml", "[auth]\ntokenz = []\n");
    assert!(ConfigLoader::new().with_optional_file(file.path()).is_err());
}

#[test]
fn invalid_file_values_fail_validation() {
    let file = file_with(
        ".toml",
        "[cors]\nallowed_origins = [\"*\"]\nallow_credentials = true\n",
    );
    let result = ConfigLoader::new().with_file(file.path()).unwrap().load();
    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[test]
fn dotenv_file_must_exist() {
    let result = ConfigLoader::new().with_dotenv_file("/nonexistent/.env");
    assert!(matches!(result, Err(ConfigError::Dotenv(_))));
}
