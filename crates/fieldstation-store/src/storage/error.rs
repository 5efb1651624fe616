//! Storage error handling
//!
//! Provides typed errors for store operations. Callers match on the
//! variant to decide whether to abort (bootstrap collisions, bad
//! arguments) or retry the whole operation (storage failures).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed caller input: bad task id, unknown table name,
    /// malformed export range. No partial mutation has happened.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Bootstrap target already exists; refusing to touch it.
    #[error("a store already exists at '{path}', not touching it")]
    AlreadyExists { path: PathBuf },

    /// Failed to create the parent directory for a new store
    #[error("failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The optional ownership change at bootstrap could not be applied.
    /// The store itself is usable; only its ownership is stale.
    #[error("could not change ownership of '{path}': {reason}")]
    Ownership { path: PathBuf, reason: String },

    /// SQLite error during any operation. Not retried internally.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Build an `InvalidArgument` error from a reason string
    pub fn invalid(reason: impl Into<String>) -> Self {
        StoreError::InvalidArgument {
            reason: reason.into(),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
