//! Common error types for beatsync

use thiserror::Error;

/// Common result type for beatsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across beatsync crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid user input or provider value
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
