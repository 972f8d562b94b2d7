//! Typed configuration for the Relay middleware pipeline.
//!
//! [`RelayConfig`] describes which units a pipeline gets and how each one is
//! tuned. [`ConfigLoader`] assembles it in layers:
//!
//! 1. defaults or a preset ([`RelayConfig::development`], [`RelayConfig::production`])
//! 2. TOML or JSON files and strings, deep-merged in call order
//! 3. `PREFIX__SECTION__KEY` environment variables
//!
//! Unknown fields are rejected at every layer and the final value is
//! validated before it is returned.
//!
//! # Example
//!
//! ```no_run
//! use relay_config::ConfigLoader;
//!
//! # fn main() -> Result<(), relay_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()?
//!     .with_optional_file("relay.toml")?
//!     .with_env_prefix("RELAY")
//!     .load()?;
//!
//! println!("rate limit: {} per {}s", config.rate_limit.limit, config.rate_limit.window_secs);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [dispatcher]
//! request_timeout_ms = 30000
//! max_in_flight = 1024
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [rate_limit]
//! enabled = true
//! limit = 100
//! window_secs = 60
//! key = "header"
//! key_header = "x-client-id"
//!
//! [auth]
//! enabled = true
//! skip_paths = ["/health"]
//!
//! [auth.tokens.s3cr3t]
//! subject = "billing-service"
//! scopes = ["invoices:write"]
//!
//! [error_boundary]
//! expose_errors = false
//! ```
//!
//! # Environment Variable Overrides
//!
//! - `RELAY__RATE_LIMIT__LIMIT=500`
//! - `RELAY__LOGGING__FORMAT=pretty`
//! - `RELAY__DISPATCHER__REQUEST_TIMEOUT_MS=none`

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::RelayConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
