//! Core error types for nterrupt-core.
//!
//! Errors are split by the taxonomy the engine cares about: invalid input is
//! rejected synchronously, while store and host failures are usually logged
//! and swallowed by the caller because wall-clock recomputation tolerates them.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for nterrupt-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Durable countdown store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Host collaborator errors (scheduler, presenter)
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Durable countdown store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open countdown store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database or in-process lock is unavailable
    #[error("Countdown store is locked")]
    Locked,

    /// Store was deliberately taken offline (tests, shutdown)
    #[error("Countdown store unavailable: {0}")]
    Unavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

/// Validation errors for control-surface input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Entity identifier is empty or whitespace
    #[error("Entity identifier must not be empty")]
    EmptyEntityId,

    /// Duration must be strictly positive
    #[error("Block duration must be positive, got {duration_ms}ms")]
    NonPositiveDuration { duration_ms: u64 },
}

/// Errors reported by host collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The host refused or throttled the request
    #[error("Host rejected {operation}: {reason}")]
    Rejected { operation: String, reason: String },

    /// The host primitive is not available in this process
    #[error("Host primitive unavailable: {0}")]
    Unavailable(String),

    /// A blocking surface could not be created or shown
    #[error("Failed to present blocking surface for {entity_id}: {message}")]
    SurfaceFailed { entity_id: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseLocked
                    || code.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
