//! Store Module
//!
//! The handle callers hold while working with a store file.
//!
//! ## Responsibilities
//! - File lifecycle: create, check, open, commit, close, delete
//! - Key operations against the open handle
//! - Applying the per-store [`ErrorMode`] to every result
//!
//! ## Handle States
//! ```text
//!   Closed ──open_file(ReadOnly)──▶ Open/Unlocked
//!     ▲   ──open_file(ReadWrite)─▶ Open/WriteLocked ──commit_file──┐
//!     │                                   ▲                         │
//!     └───────────close_file──────────────┴─────────────────────────┘
//! ```
//! A write-locked handle always has exactly one exclusive transaction open.

mod lifecycle;
mod keys;

use std::path::{Path, PathBuf};

use crate::backend::{EngineConnection, EngineError, SqliteEngine, StorageEngine};
use crate::config::{Config, ErrorMode};
use crate::error::{Result, StorxError};

/// Format version written to (and expected in) the metadata row
pub const FORMAT_VERSION: &str = "5.0";

// =============================================================================
// Statements
// =============================================================================

const TABLE: &str = "main";
const CREATE_TABLE: &str = "CREATE TABLE main (keyName TEXT PRIMARY KEY, keyValue TEXT)";
const DROP_TABLE: &str = "DROP TABLE main";
const INSERT_ROW: &str = "INSERT INTO main (keyName, keyValue) VALUES (?1, ?2)";
const UPDATE_ROW: &str = "UPDATE main SET keyValue = ?2 WHERE keyName = ?1";
const DELETE_ROW: &str = "DELETE FROM main WHERE keyName = ?1";
const SELECT_NAME: &str = "SELECT keyName FROM main WHERE keyName = ?1";
const SELECT_VALUE: &str = "SELECT keyValue FROM main WHERE keyName = ?1";
const SELECT_ALL: &str = "SELECT keyName, keyValue FROM main WHERE keyName <> ?1";
const COUNT_ROWS: &str = "SELECT COUNT(*) FROM main WHERE keyName <> ?1";

// =============================================================================
// Public State Types
// =============================================================================

/// Access requested when opening a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Closed,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Unlocked,
    WriteLocked,
}

/// Result of probing a path with [`Store::check_file`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCheck {
    /// Nothing exists at the path
    Absent,

    /// A store file of the current format version
    CurrentVersion,

    /// A store file written by a different format version
    OtherVersion,

    /// A valid engine container that was never initialized as a store
    UnrecognizedContainer,

    /// Another writer holds the exclusive lock
    LockedContainer,

    /// Not a container of the storage engine at all
    NotAContainer,
}

impl FileCheck {
    /// Numeric status as reported by older clients
    pub fn code(&self) -> u8 {
        match self {
            FileCheck::Absent => 0,
            FileCheck::CurrentVersion => 1,
            FileCheck::OtherVersion => 2,
            FileCheck::UnrecognizedContainer => 3,
            FileCheck::LockedContainer => 4,
            FileCheck::NotAContainer => 5,
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// An open session against a store file
struct Handle<C> {
    path: PathBuf,
    conn: C,
    lock: LockStatus,
}

impl<C: EngineConnection> Handle<C> {
    fn display(&self) -> String {
        self.path.display().to_string()
    }

    fn engine_err(&self, err: EngineError) -> StorxError {
        StorxError::from_engine(err, &self.display())
    }
}

/// A key-value store bound to at most one open file at a time
///
/// ## Example
/// ```no_run
/// use storx::{AccessMode, Store, Value};
///
/// let mut store = Store::default();
/// store.create_file("app.db")?;
/// store.open_file("app.db", AccessMode::ReadWrite)?;
/// store.write_key("count", &Value::from(42))?;
/// store.close_file()?;
/// # Ok::<(), storx::StorxError>(())
/// ```
pub struct Store<E: StorageEngine = SqliteEngine> {
    engine: E,
    config: Config,
    handle: Option<Handle<E::Connection>>,
}

impl Store<SqliteEngine> {
    /// Create a store backed by SQLite
    pub fn new(config: Config) -> Self {
        Self::with_engine(SqliteEngine, config)
    }
}

impl Default for Store<SqliteEngine> {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl<E: StorageEngine> Store<E> {
    /// Create a store on top of a custom storage engine
    pub fn with_engine(engine: E, config: Config) -> Self {
        Self {
            engine,
            config,
            handle: None,
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn error_mode(&self) -> ErrorMode {
        self.config.error_mode
    }

    pub fn set_error_mode(&mut self, mode: ErrorMode) {
        self.config.error_mode = mode;
    }

    pub fn busy_timeout_ms(&self) -> u64 {
        self.config.busy_timeout_ms
    }

    /// Change the busy timeout, including on the currently open connection
    pub fn set_busy_timeout_ms(&mut self, ms: u64) -> Result<()> {
        self.config.busy_timeout_ms = ms;

        let applied = match &self.handle {
            Some(handle) => handle.conn.busy_timeout(ms).map_err(|e| handle.engine_err(e)),
            None => Ok(()),
        };
        self.report(applied)
    }

    // =========================================================================
    // Handle State
    // =========================================================================

    /// Path of the open file, if any
    pub fn path(&self) -> Option<&Path> {
        self.handle.as_ref().map(|h| h.path.as_path())
    }

    pub fn file_status(&self) -> FileStatus {
        match self.handle {
            Some(_) => FileStatus::Open,
            None => FileStatus::Closed,
        }
    }

    pub fn lock_status(&self) -> LockStatus {
        self.handle
            .as_ref()
            .map(|h| h.lock)
            .unwrap_or(LockStatus::Unlocked)
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.lock_status() == LockStatus::WriteLocked
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    fn handle(&self) -> Result<&Handle<E::Connection>> {
        self.handle.as_ref().ok_or(StorxError::NoHandleOpen)
    }

    fn writable_handle(&self) -> Result<&Handle<E::Connection>> {
        let handle = self.handle()?;
        match handle.lock {
            LockStatus::WriteLocked => Ok(handle),
            LockStatus::Unlocked => Err(StorxError::NotWritable(handle.display())),
        }
    }

    /// Apply the error mode to an operation's result
    ///
    /// In [`ErrorMode::Raise`] faults unwind with the error as panic payload.
    fn report<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Err(err) if err.is_fault() && self.config.error_mode == ErrorMode::Raise => {
                tracing::error!("StorX fault (code {}): {}", err.code(), err);
                std::panic::panic_any(err)
            }
            Err(err) => {
                tracing::debug!("StorX operation failed (code {}): {}", err.code(), err);
                Err(err)
            }
            ok => ok,
        }
    }
}

impl<E: StorageEngine> Drop for Store<E> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.lock == LockStatus::WriteLocked {
                tracing::warn!(
                    "Store dropped with {} open for writing; uncommitted changes rolled back",
                    handle.display()
                );
            }
            let _ = handle.conn.close();
        }
    }
}
