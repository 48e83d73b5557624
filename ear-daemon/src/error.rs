//! Error types for ear-daemon
//!
//! Recoverable classes (device, provider, persistence) are handled inside the
//! supervisor. Only `ContractViolation` ends `Supervisor::run` with an error.

use thiserror::Error;

/// Main error type for ear-daemon
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Capture device could not be opened or the session was lost
    #[error("Audio device error: {0}")]
    Device(String),

    /// Event log, feedback log or heartbeat could not be written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Caller broke an API contract (e.g. wrong sample block size)
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// Operation not possible in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ear-common error
    #[error("Common error: {0}")]
    Common(#[from] ear_common::Error),
}

/// Convenience Result type using ear-daemon Error
pub type Result<T> = std::result::Result<T, Error>;
