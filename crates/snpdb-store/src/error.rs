//! Error types for the store.
//!
//! [`SchemaError`] describes why a live schema is not the expected one and is
//! recoverable through [`crate::Database::fix`]. [`StoreError`] is what every
//! store operation returns.

use std::path::PathBuf;

use thiserror::Error;

/// A live schema that does not match its catalog.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// The database holds no tables or indexes.
    #[error("schema is empty")]
    Empty,

    /// The tables match a known obsolete layout.
    #[error("schema is a legacy layout (fingerprint {fingerprint})")]
    Legacy {
        /// Tables fingerprint of the live database.
        fingerprint: String,
    },

    /// Table definitions differ from the catalog.
    #[error("tables mismatch: expected {expected}, found {found}")]
    TablesMismatch {
        /// Catalog tables fingerprint.
        expected: String,
        /// Live tables fingerprint.
        found: String,
    },

    /// Index definitions differ from the catalog.
    #[error("indexes mismatch: expected {expected}, found {found}")]
    IndexesMismatch {
        /// Catalog indexes fingerprint.
        expected: String,
        /// Live indexes fingerprint.
        found: String,
    },
}

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A query could not be built or serialized.
    #[error("query error: {0}")]
    Sql(#[from] snpdb_sql::SqlError),

    /// `SQLite` rejected a statement.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The live schema is not the expected one.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The connection for this path has been closed.
    #[error("connection closed: {}", .0.display())]
    ConnectionClosed(PathBuf),

    /// The worker thread panicked; queued requests are failed with this.
    #[error("worker crashed: {0}")]
    WorkerCrashed(String),

    /// A rectify plan failed and was rolled back.
    #[error("migration error: {message}")]
    Migration {
        /// Which plan failed and why.
        message: String,
    },

    /// A mutating statement was sent through a read-only handle.
    #[error("database is open read-only")]
    ReadOnly,

    /// Write access requested on a path already opened read-only.
    #[error("{} is already open read-only", .0.display())]
    ModeConflict(PathBuf),

    /// Open mode other than `r` or `w`.
    #[error("invalid open mode {0:?}, expected \"r\" or \"w\"")]
    InvalidMode(String),

    /// Filesystem error while resolving or creating the database file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
