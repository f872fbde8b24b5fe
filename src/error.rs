//! Error types for TideKV
//!
//! Provides a unified error type for all operations. Missing and expired keys
//! are not errors: reads report them as `None` / `false`.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using TideError
pub type Result<T> = std::result::Result<T, TideError>;

/// Which persistence step failed after the in-memory state was mutated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStage {
    Snapshot,
    OperationLog,
}

impl fmt::Display for PersistStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistStage::Snapshot => f.write_str("snapshot write"),
            PersistStage::OperationLog => f.write_str("operation log append"),
        }
    }
}

/// Unified error type for TideKV operations
#[derive(Debug, Error)]
pub enum TideError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Persistence Errors
    // -------------------------------------------------------------------------
    #[error("Snapshot at {path} is unreadable: {reason}")]
    CorruptSnapshot { path: PathBuf, reason: String },

    /// The mutation is already applied in memory; disk may lag behind it.
    #[error("{stage} failed, in-memory and on-disk state may have diverged: {source}")]
    Persistence {
        stage: PersistStage,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Value Errors
    // -------------------------------------------------------------------------
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Parse error: {0}")]
    Parse(String),

    // -------------------------------------------------------------------------
    // Replication Errors
    // -------------------------------------------------------------------------
    #[error("Replication error: {0}")]
    Replication(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TideError {
    pub(crate) fn persistence(stage: PersistStage, source: std::io::Error) -> Self {
        TideError::Persistence { stage, source }
    }

    /// True when the error left memory ahead of disk
    pub fn is_divergent(&self) -> bool {
        matches!(self, TideError::Persistence { .. })
    }
}

impl From<serde_json::Error> for TideError {
    fn from(err: serde_json::Error) -> Self {
        TideError::Serialization(err.to_string())
    }
}
