//! Facade error type.

use thiserror::Error;

/// Errors from assembling a pipeline or initializing telemetry.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration failed to load or validate.
    #[error(transparent)]
    Config(#[from] relay_config::ConfigError),

    /// Telemetry could not be installed.
    #[error(transparent)]
    Telemetry(#[from] relay_telemetry::TelemetryError),

    /// Pipeline assembly or request processing failed.
    #[error(transparent)]
    Relay(#[from] relay_core::RelayError),
}

impl From<relay_core::InvalidPipelineError> for Error {
    fn from(err: relay_core::InvalidPipelineError) -> Self {
        Self::Relay(err.into())
    }
}

/// Result alias for facade operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
