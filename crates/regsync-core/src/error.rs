//! Centralized error types for regsync.

use thiserror::Error;

/// Main error type for regsync operations.
#[derive(Error, Debug)]
pub enum RegsyncError {
    /// Graph store unreachable, pool exhausted past the acquisition timeout, or auth failure.
    #[error("Graph store connection error: {0}")]
    Connection(String),

    #[error("Graph query failed: {0}")]
    Query(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Phase '{phase}' failed: {message}")]
    Phase { phase: String, message: String },

    #[error("Malformed row in '{view}': {message}")]
    MalformedRow { view: String, message: String },

    #[error("Source error: {0}")]
    Source(#[from] regsync_db::DbError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for regsync operations.
pub type RegsyncResult<T> = Result<T, RegsyncError>;

impl RegsyncError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Create a schema mismatch error.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap any failure as a phase error.
    pub fn phase(phase: impl Into<String>, msg: impl std::fmt::Display) -> Self {
        Self::Phase {
            phase: phase.into(),
            message: msg.to_string(),
        }
    }

    /// Connection errors end the invocation; everything else is recorded and skipped.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}
