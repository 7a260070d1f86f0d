//! Error types for connwatch

use std::time::Duration;

use thiserror::Error;

/// Core error type for connwatch operations
#[derive(Error, Debug)]
pub enum ConnwatchError {
    #[error("Connection error: {0}")]
    Connection(String),

    /// The pool could not hand out a connection within its wait bound
    #[error("Exceeded maximum wait for connection ({max_size} max, waited {waited:?})")]
    AcquisitionTimeout { max_size: usize, waited: Duration },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl ConnwatchError {
    /// Whether this error means the pool ran out of connections
    pub fn is_acquisition_timeout(&self) -> bool {
        matches!(self, ConnwatchError::AcquisitionTimeout { .. })
    }
}

/// Result type alias for connwatch operations
pub type Result<T> = std::result::Result<T, ConnwatchError>;
