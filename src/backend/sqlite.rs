//! SQLite adapter
//!
//! Implements the engine traits on top of `rusqlite`. The database stays in
//! rollback-journal mode: `BEGIN EXCLUSIVE` then locks out readers as well as
//! writers, which is the lock model the store relies on.

use std::path::Path;
use std::time::Duration;

use rusqlite::{params_from_iter, Connection, ErrorCode, OpenFlags};

use super::{EngineConnection, EngineError, EngineErrorKind, EngineResult, OpenMode, Row, StorageEngine};

/// The default engine: SQLite via `rusqlite`
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteEngine;

impl StorageEngine for SqliteEngine {
    type Connection = SqliteConnection;

    fn open(&self, path: &Path, mode: OpenMode, busy_timeout_ms: u64) -> EngineResult<SqliteConnection> {
        let flags = match mode {
            OpenMode::Create => {
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
            }
            OpenMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            OpenMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        };

        let conn = Connection::open_with_flags(path, flags).map_err(map_err)?;
        let conn = SqliteConnection { conn };
        conn.busy_timeout(busy_timeout_ms)?;

        tracing::trace!("sqlite connection opened: {} ({:?})", path.display(), mode);
        Ok(conn)
    }
}

/// One open SQLite connection
#[derive(Debug)]
pub struct SqliteConnection {
    conn: Connection,
}

impl EngineConnection for SqliteConnection {
    fn busy_timeout(&self, ms: u64) -> EngineResult<()> {
        self.conn
            .busy_timeout(Duration::from_millis(ms))
            .map_err(map_err)
    }

    fn exec(&self, statement: &str, params: &[&str]) -> EngineResult<usize> {
        self.conn
            .execute(statement, params_from_iter(params.iter()))
            .map_err(map_err)
    }

    fn query(&self, statement: &str, params: &[&str]) -> EngineResult<Vec<Row>> {
        let mut stmt = self.conn.prepare(statement).map_err(map_err)?;
        let columns = stmt.column_count();

        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                (0..columns)
                    .map(|i| row.get::<_, Option<String>>(i))
                    .collect::<rusqlite::Result<Row>>()
            })
            .map_err(map_err)?;

        rows.collect::<rusqlite::Result<Vec<Row>>>().map_err(map_err)
    }

    fn count(&self, statement: &str, params: &[&str]) -> EngineResult<u64> {
        let count: i64 = self
            .conn
            .query_row(statement, params_from_iter(params.iter()), |row| row.get(0))
            .map_err(map_err)?;

        u64::try_from(count)
            .map_err(|_| EngineError::new(EngineErrorKind::Other, format!("negative count {}", count)))
    }

    fn table_exists(&self, table: &str) -> EngineResult<bool> {
        let tables = self.count(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            &[table],
        )?;
        Ok(tables > 0)
    }

    fn begin_exclusive(&self) -> EngineResult<()> {
        self.conn.execute_batch("BEGIN EXCLUSIVE;").map_err(map_err)
    }

    fn commit(&self) -> EngineResult<()> {
        self.conn.execute_batch("COMMIT;").map_err(map_err)
    }

    fn close(self) -> EngineResult<()> {
        self.conn.close().map_err(|(_, e)| map_err(e))
    }
}

/// Classify a rusqlite error by its primary result code
fn map_err(err: rusqlite::Error) -> EngineError {
    let kind = match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => EngineErrorKind::Busy,
        Some(ErrorCode::NotADatabase) => EngineErrorKind::NotADatabase,
        Some(ErrorCode::CannotOpen) => EngineErrorKind::CannotOpen,
        _ => EngineErrorKind::Other,
    };
    EngineError::new(kind, err.to_string())
}
