//! Error types for logtable
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using LogTableError
pub type Result<T> = std::result::Result<T, LogTableError>;

/// Unified error type for logtable operations
#[derive(Debug, Error)]
pub enum LogTableError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Catalog Errors
    // -------------------------------------------------------------------------
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    #[error("Consistency check failed: {0}")]
    Consistency(String),

    #[error("Index is read-only: {0}")]
    ReadOnly(String),

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt format: {0}")]
    CorruptFormat(String),

    #[error("Unfinished table chunk: {}", .0.display())]
    UnfinishedChunk(PathBuf),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Timed out after {waited_ms}ms waiting for lock {}", .path.display())]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for LogTableError {
    fn from(err: bincode::Error) -> Self {
        LogTableError::Serialization(err.to_string())
    }
}
