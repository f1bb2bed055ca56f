//! Error types for the batis runtime core.
//!
//! All public APIs return `BatisResult<T>`; library code does not panic.

use thiserror::Error;

/// Unified error type for all batis operations.
#[derive(Debug, Error)]
pub enum BatisError {
    /// No connection became available within the configured wait time
    #[error("timed out after {waited_ms}ms waiting for a pooled connection")]
    PoolTimeout { waited_ms: u64 },

    /// Too many bad connections were handed out during one acquisition
    #[error("could not get a good connection to the database: {0}")]
    ConnectionAcquisition(String),

    /// A blocked acquisition was interrupted
    #[error("interrupted while waiting for a pooled connection")]
    Interrupted,

    /// Operation on a connection wrapper that was returned, reclaimed or invalidated
    #[error("connection is closed")]
    ConnectionClosed,

    /// Physical connection (driver) failure
    #[error("connection error: {0}")]
    Connection(String),

    /// Stampede guard could not take the per-key lock in time
    #[error("couldn't get a lock in {timeout_ms}ms for the key {key} at the cache {cache_id}")]
    LockTimeout {
        key: String,
        cache_id: String,
        timeout_ms: u64,
    },

    /// Programming defect, e.g. releasing a cache lock that is not held
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Test expression could not be parsed or evaluated
    #[error("expression error in '{expression}': {message}")]
    Expression { expression: String, message: String },

    /// Placeholder or binding could not be resolved
    #[error("binding error: {0}")]
    Binding(String),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Statement execution failure reported by the execution pipeline
    #[error("error executing statement '{statement}': {message}")]
    Execution { statement: String, message: String },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for all batis operations.
pub type BatisResult<T> = Result<T, BatisError>;

impl From<serde_json::Error> for BatisError {
    fn from(err: serde_json::Error) -> Self {
        BatisError::Serialization(err.to_string())
    }
}

impl BatisError {
    /// Shorthand for a physical connection failure.
    pub fn connection(message: impl Into<String>) -> Self {
        BatisError::Connection(message.into())
    }
}
