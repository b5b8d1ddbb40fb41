//! Error types for the memoria-imessage library.
//!
//! Only structurally fatal conditions travel through [`PreprocessError`].
//! Per-row and per-file problems are reported as result-with-reason values
//! by the modules that produce them and end up in the run statistics.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while preprocessing iMessage exports.
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Neither a desktop nor a mobile database was found in the export
    #[error("Unknown export layout at {}", .0.display())]
    UnknownExportLayout(PathBuf),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Rejected user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Worker pool could not be created
    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// Logging could not be installed
    #[error("Logging error: {0}")]
    Logging(String),
}

/// Convenience type alias for Result with PreprocessError
pub type Result<T> = std::result::Result<T, PreprocessError>;
