//! Error handling for the Quay CLI.
//!
//! The CLI wraps the core's errors and renders them as miette reports at
//! the top level.

use quay_server::{ConfigError, ServerError};
use thiserror::Error;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Errors from the dev server core.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Configuration loading or validation errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors from file system operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid command-line arguments or options.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias using `CliError` as the default error type.
pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Convert a CLI error into a miette report for terminal rendering.
pub fn to_report(err: CliError) -> miette::Report {
    miette::miette!("{err}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_is_transparent() {
        let err: CliError = ServerError::PortAllocation {
            start: 3000,
            end: 3010,
        }
        .into();
        assert!(err.to_string().contains("3000-3010"));
    }

    #[test]
    fn test_config_error_is_prefixed() {
        let err: CliError = ConfigError::InvalidValue {
            field: "port".to_string(),
            value: "0".to_string(),
            hint: "Use a port between 1 and 65535".to_string(),
        }
        .into();
        assert!(err.to_string().starts_with("Configuration error:"));
    }
}
