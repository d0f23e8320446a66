//! Unified error types for caret-batch.
//!
//! Per-command problems (non-zero exits, launch failures, timeouts) are not
//! errors here: they are recorded as data on each `ExecutionResult`.

use std::path::PathBuf;
use thiserror::Error;

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Errors that abort a whole `run` call before anything executes
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("batch contains no work items")]
    EmptyBatch,

    #[error("maximum concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),
}

/// Manifest loading errors
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Manifest not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse manifest {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Manifest {0} contains no work items")]
    Empty(PathBuf),

    #[error("Manifest {0} declares max_concurrency = 0")]
    ZeroConcurrency(PathBuf),

    #[error("IO error reading manifest: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for batch execution
pub type BatchResult<T> = std::result::Result<T, BatchError>;

/// Result type alias for manifest loading
pub type ManifestResult<T> = std::result::Result<T, ManifestError>;
