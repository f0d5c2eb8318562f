//! Error types for beatsync-ap
//!
//! Defines module-specific error types using thiserror. None of these is fatal
//! to the process except an audio device that cannot be opened at startup.

use std::time::Duration;
use thiserror::Error;

/// Main error type for beatsync-ap
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Tick sound could not be decoded
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using beatsync-ap Error
pub type Result<T> = std::result::Result<T, Error>;

/// Failures talking to the music service.
///
/// Always recoverable: the poll cycle is skipped and the next one retries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Token rejected (expired or revoked)
    #[error("music service rejected the access token")]
    Unauthorized,

    /// No session installed yet
    #[error("no music service session (credentials missing)")]
    NotAuthorized,

    /// Too many requests
    #[error("rate limited by music service (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Transport failure (DNS, connect, timeout)
    #[error("network error: {0}")]
    Network(String),

    /// Non-success status not covered above
    #[error("music service returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Response did not have the expected shape or values
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Failures playing a single tick.
///
/// Always transient: the tick is skipped and the clock carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// Output stream is down (device removed, stream error)
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Previous tick not yet picked up by the device
    #[error("audio device busy")]
    Busy,
}
