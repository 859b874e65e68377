//! Error types for the dev server core.
//!
//! The taxonomy mirrors the failure surfaces of the lifecycle: port
//! allocation, bundler startup, configuration reload, and the readiness
//! gate. Callback panics are deliberately absent here - they are caught
//! and logged per callback, never propagated.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the dev server core.
#[derive(Debug, Error)]
pub enum ServerError {
    /// No bindable port within the scan range; fatal to the session attempt.
    #[error("No free port in range {start}-{end}\n\nHint: Stop the process holding the port or pick another one with --port")]
    PortAllocation {
        /// First port probed.
        start: u16,
        /// Last port probed.
        end: u16,
    },

    /// The bundler collaborator failed to initialize.
    #[error("Bundler failed to start: {0}")]
    BundlerStart(String),

    /// The merged configuration is invalid; a restart aborts after the old
    /// session is already closed.
    #[error("Configuration error: {0}")]
    ConfigReload(#[from] ConfigError),

    /// The bundler terminated before reporting its first successful build.
    #[error("Bundler stopped before the first successful build: {0}")]
    BuildFailed(String),

    /// File watching errors from the config watch subscription.
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// I/O errors from socket or file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP listener errors.
    #[error("Server error: {0}")]
    Server(String),

    /// The lifecycle manager has been closed; no further operations are accepted.
    #[error("Dev server is closed")]
    Closed,
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file doesn't exist at the expected location.
    #[error("Config file not found: {}\n\nHint: Create a quay.config.json or pass --config <path>", .0.display())]
    NotFound(PathBuf),

    /// The figment merge/extraction failed (bad JSON, wrong field types).
    #[error("Invalid configuration: {0}\n\nHint: Check quay.config.json syntax and field types")]
    Extraction(#[from] figment::Error),

    /// A recognized field holds a value the server cannot run with.
    #[error("Invalid value for '{field}': {value}\n\nHint: {hint}")]
    InvalidValue {
        /// Name of the field with the invalid value.
        field: String,
        /// The invalid value.
        value: String,
        /// Guidance for a correct value.
        hint: String,
    },
}

/// Result type alias using `ServerError` as the default error type.
pub type Result<T, E = ServerError> = std::result::Result<T, E>;
