//! Common error types for the weekly playlist bot

use thiserror::Error;

/// Common result type for startup and configuration operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised before the pipeline proper begins
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or setting value
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
