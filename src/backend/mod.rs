//! Storage Engine Adapter
//!
//! Thin interface to the transactional engine that owns the bytes on disk.
//!
//! ## Responsibilities
//! - Open a container file in create / read-only / read-write mode
//! - Run parameterized statements and row queries
//! - Exclusive transactions (one writer per file)
//! - Busy timeout for lock acquisition
//!
//! The engine is a black box that provides ACID semantics. Everything above
//! this module talks to it only through [`StorageEngine`] and
//! [`EngineConnection`], so the store never builds statements by string
//! interpolation of user data.

mod sqlite;

pub use sqlite::{SqliteConnection, SqliteEngine};

use std::path::Path;

use thiserror::Error;

/// Result type alias for adapter calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// One result row; every column the store reads is TEXT (or NULL)
pub type Row = Vec<Option<String>>;

/// How the adapter should open a container file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create the file if missing, open read-write
    Create,

    /// Shared read-only access
    ReadOnly,

    /// Read-write access to an existing file
    ReadWrite,
}

/// Classification of an engine failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Another connection holds a conflicting lock (busy timeout expired)
    Busy,

    /// The file exists but is not a container of this engine
    NotADatabase,

    /// The file could not be opened at all
    CannotOpen,

    /// Anything else the engine reports
    Other,
}

/// Error reported by the storage engine
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EngineError {
    kind: EngineErrorKind,
    message: String,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> EngineErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True if the failure was lock contention
    pub fn is_busy(&self) -> bool {
        self.kind == EngineErrorKind::Busy
    }
}

/// Factory for engine connections
pub trait StorageEngine {
    type Connection: EngineConnection;

    /// Open `path` in the given mode
    ///
    /// `busy_timeout_ms` bounds how long any later statement waits for a lock.
    fn open(&self, path: &Path, mode: OpenMode, busy_timeout_ms: u64)
        -> EngineResult<Self::Connection>;
}

/// A single open connection to a container file
pub trait EngineConnection {
    /// Change the lock wait bound on a live connection
    fn busy_timeout(&self, ms: u64) -> EngineResult<()>;

    /// Run a statement that returns no rows; returns the number of rows changed
    fn exec(&self, statement: &str, params: &[&str]) -> EngineResult<usize>;

    /// Run a statement and collect every row
    fn query(&self, statement: &str, params: &[&str]) -> EngineResult<Vec<Row>>;

    /// Run a single-row `COUNT(*)` style statement and return its integer
    fn count(&self, statement: &str, params: &[&str]) -> EngineResult<u64>;

    /// Whether a table with this name exists in the container
    fn table_exists(&self, table: &str) -> EngineResult<bool>;

    /// Begin an exclusive transaction (blocks other writers and readers)
    fn begin_exclusive(&self) -> EngineResult<()>;

    /// Commit the open transaction
    fn commit(&self) -> EngineResult<()>;

    /// Release the connection; an open transaction is rolled back
    fn close(self) -> EngineResult<()>;
}
