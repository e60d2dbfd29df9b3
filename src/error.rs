//! Error type for the snapshot loader.
//!
//! Every variant names the loader step that failed so callers can tell an
//! unreadable source apart from a copy or pragma failure.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, LoadError>;

#[derive(Debug, Error)]
pub enum LoadError {
    /// Step 1: the durable dataset is missing, unreadable or not a database.
    #[error("failed to open source database {path}: {source}")]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Step 1: the source opened but does not hold the relation to copy.
    #[error("source database {path} has no table {table}")]
    SourceTableMissing { path: PathBuf, table: String },

    /// Step 2: the in-memory store could not be opened.
    #[error("failed to open in-memory store {store}: {source}")]
    StoreOpen {
        store: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The in-memory store already holds the target relation.
    #[error("in-memory store {store} already holds table {table}")]
    StoreOccupied { store: String, table: String },

    /// Step 3: ATTACH of the source into the store namespace failed.
    #[error("failed to attach source as {alias}: {source}")]
    Attach {
        alias: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Step 4: the bulk copy (or its index build) failed.
    #[error("failed to copy table {table} into snapshot: {source}")]
    Copy {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Step 5: DETACH failed.
    #[error("failed to detach {alias}: {source}")]
    Detach {
        alias: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Step 5: DETACH returned but the alias is still listed.
    #[error("alias {0} still attached after detach")]
    StillAttached(String),

    /// Step 6: a pragma failed to apply.
    #[error("failed to apply PRAGMA {directive}: {source}")]
    Pragma {
        directive: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// Step 6: a pragma applied but the store reports another value.
    #[error("PRAGMA {directive} reported {actual}, expected {expected}")]
    PragmaRejected {
        directive: &'static str,
        expected: String,
        actual: String,
    },

    /// A configured table, alias or column name is not a plain identifier.
    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Closing a connection failed.
    #[error("failed to close {what}: {source}")]
    Close {
        what: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// Query against an already loaded snapshot failed.
    #[error("snapshot query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

impl LoadError {
    /// Loader step (1-7) this error belongs to, or `None` for errors raised
    /// outside the load sequence.
    pub fn step(&self) -> Option<u8> {
        match self {
            LoadError::SourceOpen { .. } | LoadError::SourceTableMissing { .. } => Some(1),
            LoadError::StoreOpen { .. } | LoadError::StoreOccupied { .. } => Some(2),
            LoadError::Attach { .. } => Some(3),
            LoadError::Copy { .. } => Some(4),
            LoadError::Detach { .. } | LoadError::StillAttached(_) => Some(5),
            LoadError::Pragma { .. } | LoadError::PragmaRejected { .. } => Some(6),
            LoadError::InvalidIdentifier(_) | LoadError::Close { .. } | LoadError::Query(_) => {
                None
            }
        }
    }
}
