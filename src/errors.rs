//! Configuration Service Error Hierarchy
//!
//! Defines the error types of the change propagation core, categorized by
//! layer: infrastructure (tasks, signals), storage (change log and secret
//! store access), configuration, and listener failures.
//!
//! Nothing in this hierarchy is fatal to the scan loops: every error that
//! surfaces inside a scheduled cycle is logged and retried on the next cycle.

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (background tasks, signals, retries)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Service configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Change log or secret store access failures
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A change listener rejected a record
    #[error("Listener failed: {0}")]
    Listener(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),

    /// Graceful exit of a long-running loop
    #[error("Exit")]
    Exit,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Store cannot be reached (connection refused, pool exhausted, ...)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Disk I/O failures
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Custom error with the path that failed
    #[error("Error occurred at path: {path}")]
    PathError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Serialization failures for persisted records
    #[error(transparent)]
    BincodeError(#[from] bincode::Error),

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    DbError(String),

    /// Persisted key or value does not decode
    #[error("Data corruption detected at {location}")]
    DataCorruption { location: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// Background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    /// A single attempt of a retried operation timed out
    #[error("Retry timeout after {0:?}")]
    RetryTimeout(Duration),

    /// Retry policy exhaustion
    #[error("Task failed after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: usize, last_error: String },

    #[error("{0}")]
    SignalSenderClosed(String),

    // Basic node operations
    #[error("Node failed to start: {0}")]
    NodeStartFailed(String),
}

// ============== Conversion Implementations ============== //
impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        Error::System(SystemError::TaskFailed(err))
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        StorageError::DbError(err.to_string()).into()
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        StorageError::BincodeError(err).into()
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err).into()
    }
}
