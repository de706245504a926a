//! Tests for the file lifecycle
//!
//! These tests verify:
//! - Creating files (and refusing to overwrite)
//! - Probing files in every state with check_file
//! - Opening read-only / read-write, including lock contention
//! - Commit, close and abandon semantics
//! - Deleting files

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rusqlite::Connection;
use storx::backend::{
    EngineError, EngineErrorKind, EngineResult, OpenMode, SqliteConnection, SqliteEngine,
    StorageEngine,
};
use storx::{
    AccessMode, Config, ErrorKind, ErrorMode, FileCheck, FileStatus, LockStatus, Store, Value,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_store() -> Store {
    let config = Config::builder()
        .busy_timeout_ms(50) // Keep lock contention tests fast
        .error_mode(ErrorMode::Return)
        .build();
    Store::new(config)
}

fn setup_temp_file(name: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(name);
    (temp_dir, path)
}

fn setup_created_file() -> (TempDir, PathBuf, Store) {
    let (temp_dir, path) = setup_temp_file("test.db");
    let store = test_store();
    store.create_file(&path).unwrap();
    (temp_dir, path, store)
}

/// Runs a competing `create_file` on the same path right before the engine
/// opens it for creation
struct CompetingCreateEngine {
    rival_result: Rc<Cell<Option<ErrorKind>>>,
}

impl StorageEngine for CompetingCreateEngine {
    type Connection = SqliteConnection;

    fn open(&self, path: &Path, mode: OpenMode, busy_timeout_ms: u64) -> EngineResult<SqliteConnection> {
        if mode == OpenMode::Create {
            let mut rival = test_store();
            let kind = match rival.create_file(path) {
                Ok(()) => {
                    rival.open_file(path, AccessMode::ReadWrite).unwrap();
                    rival.write_key("precious", &Value::Int(7)).unwrap();
                    rival.close_file().unwrap();
                    None
                }
                Err(e) => Some(e.kind()),
            };
            self.rival_result.set(kind);
        }
        SqliteEngine.open(path, mode, busy_timeout_ms)
    }
}

/// Refuses to open anything for creation
struct BrokenCreateEngine;

impl StorageEngine for BrokenCreateEngine {
    type Connection = SqliteConnection;

    fn open(&self, path: &Path, mode: OpenMode, busy_timeout_ms: u64) -> EngineResult<SqliteConnection> {
        if mode == OpenMode::Create {
            return Err(EngineError::new(EngineErrorKind::CannotOpen, "unable to open database file"));
        }
        SqliteEngine.open(path, mode, busy_timeout_ms)
    }
}

fn return_mode() -> Config {
    Config::builder()
        .busy_timeout_ms(50)
        .error_mode(ErrorMode::Return)
        .build()
}

// =============================================================================
// Create Tests
// =============================================================================

#[test]
fn test_create_file() {
    let (_temp, path) = setup_temp_file("new.db");
    let store = test_store();

    store.create_file(&path).unwrap();

    assert!(path.exists());
    assert_eq!(store.check_file(&path), FileCheck::CurrentVersion);
}

#[test]
fn test_create_file_twice_fails() {
    let (_temp, path, store) = setup_created_file();

    let err = store.create_file(&path).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(err.code(), 106);
}

#[test]
fn test_create_does_not_overwrite_foreign_file() {
    let (_temp, path) = setup_temp_file("notes.txt");
    fs::write(&path, b"important notes").unwrap();
    let store = test_store();

    assert!(store.create_file(&path).is_err());
    assert_eq!(fs::read(&path).unwrap(), b"important notes");
}

#[test]
fn test_create_claims_path_before_engine_open() {
    let (_temp, path) = setup_temp_file("contested.db");
    let rival_result = Rc::new(Cell::new(None));
    let engine = CompetingCreateEngine {
        rival_result: Rc::clone(&rival_result),
    };
    let store = Store::with_engine(engine, return_mode());

    store.create_file(&path).unwrap();

    // The competing create lost and left nothing behind
    assert_eq!(rival_result.get(), Some(ErrorKind::AlreadyExists));
    assert_eq!(store.check_file(&path), FileCheck::CurrentVersion);

    let mut reader = test_store();
    reader.open_file(&path, AccessMode::ReadOnly).unwrap();
    assert_eq!(reader.key_count().unwrap(), 0);
}

#[test]
fn test_create_does_not_touch_existing_store() {
    let (_temp, path, mut owner) = setup_created_file();
    owner.open_file(&path, AccessMode::ReadWrite).unwrap();
    owner.write_key("precious", &Value::Int(7)).unwrap();
    owner.close_file().unwrap();

    let err = test_store().create_file(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    owner.open_file(&path, AccessMode::ReadOnly).unwrap();
    assert_eq!(owner.read_key("precious").unwrap(), Value::Int(7));
}

#[test]
fn test_failed_create_removes_claimed_file() {
    let (_temp, path) = setup_temp_file("broken.db");
    let store = Store::with_engine(BrokenCreateEngine, return_mode());

    let err = store.create_file(&path).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BackendFailure);
    assert!(!path.exists());
    assert_eq!(store.check_file(&path), FileCheck::Absent);
}

#[test]
fn test_created_file_has_metadata_row() {
    let (_temp, path, _store) = setup_created_file();

    let conn = Connection::open(&path).unwrap();
    let version: String = conn
        .query_row(
            "SELECT keyValue FROM main WHERE keyName = 'StorXInfo'",
            [],
            |row| row.get(0),
        )
        .unwrap();

    assert_eq!(version, storx::FORMAT_VERSION);
}

// =============================================================================
// Check Tests
// =============================================================================

#[test]
fn test_check_absent_file() {
    let (_temp, path) = setup_temp_file("missing.db");
    let store = test_store();

    let status = store.check_file(&path);

    assert_eq!(status, FileCheck::Absent);
    assert_eq!(status.code(), 0);
}

#[test]
fn test_check_not_a_container() {
    let (_temp, path) = setup_temp_file("invalid.db");
    fs::write(&path, vec![b'x'; 1024]).unwrap();
    let store = test_store();

    let status = store.check_file(&path);

    assert_eq!(status, FileCheck::NotAContainer);
    assert_eq!(status.code(), 5);
}

#[test]
fn test_check_does_not_modify_file() {
    let (_temp, path) = setup_temp_file("invalid.db");
    fs::write(&path, b"not a database").unwrap();
    let store = test_store();

    store.check_file(&path);

    assert_eq!(fs::read(&path).unwrap(), b"not a database");
}

#[test]
fn test_check_foreign_sqlite_database() {
    let (_temp, path) = setup_temp_file("other.db");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute("CREATE TABLE users (id INTEGER PRIMARY KEY)", [])
            .unwrap();
    }
    let store = test_store();

    assert_eq!(store.check_file(&path), FileCheck::UnrecognizedContainer);
}

#[test]
fn test_check_main_table_without_metadata() {
    let (_temp, path) = setup_temp_file("bare.db");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "CREATE TABLE main (keyName TEXT PRIMARY KEY, keyValue TEXT)",
            [],
        )
        .unwrap();
    }
    let store = test_store();

    assert_eq!(store.check_file(&path), FileCheck::UnrecognizedContainer);
}

#[test]
fn test_check_empty_file() {
    let (_temp, path) = setup_temp_file("empty.db");
    fs::write(&path, b"").unwrap();
    let store = test_store();

    assert_eq!(store.check_file(&path), FileCheck::UnrecognizedContainer);
}

#[test]
fn test_check_other_version() {
    let (_temp, path, store) = setup_created_file();
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "UPDATE main SET keyValue = 'v3.1' WHERE keyName = 'StorXInfo'",
            [],
        )
        .unwrap();
    }

    assert_eq!(store.check_file(&path), FileCheck::OtherVersion);
}

#[test]
fn test_check_locked_file() {
    let (_temp, path, mut writer) = setup_created_file();
    writer.open_file(&path, AccessMode::ReadWrite).unwrap();

    let prober = test_store();
    let status = prober.check_file(&path);

    assert_eq!(status, FileCheck::LockedContainer);
    assert_eq!(status.code(), 4);

    writer.close_file().unwrap();
    assert_eq!(prober.check_file(&path), FileCheck::CurrentVersion);
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_missing_file() {
    let (_temp, path) = setup_temp_file("missing.db");
    let mut store = test_store();

    let err = store.open_file(&path, AccessMode::ReadOnly).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.code(), 101);
    assert_eq!(store.file_status(), FileStatus::Closed);
}

#[test]
fn test_open_read_only() {
    let (_temp, path, mut store) = setup_created_file();

    store.open_file(&path, AccessMode::ReadOnly).unwrap();

    assert_eq!(store.file_status(), FileStatus::Open);
    assert_eq!(store.lock_status(), LockStatus::Unlocked);
    assert_eq!(store.path(), Some(path.as_path()));
    assert!(!store.is_writable());
}

#[test]
fn test_open_read_write() {
    let (_temp, path, mut store) = setup_created_file();

    store.open_file(&path, AccessMode::ReadWrite).unwrap();

    assert!(store.is_open());
    assert!(store.is_writable());
    assert_eq!(store.lock_status(), LockStatus::WriteLocked);
}

#[test]
fn test_open_wrong_format() {
    let (_temp, path) = setup_temp_file("invalid.db");
    fs::write(&path, vec![b'x'; 1024]).unwrap();
    let mut store = test_store();

    let err = store.open_file(&path, AccessMode::ReadOnly).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FormatMismatch);
    assert!(!store.is_open());
}

#[test]
fn test_open_other_version_fails() {
    let (_temp, path, mut store) = setup_created_file();
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "UPDATE main SET keyValue = '4.0' WHERE keyName = 'StorXInfo'",
            [],
        )
        .unwrap();
    }

    let err = store.open_file(&path, AccessMode::ReadWrite).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FormatMismatch);
    assert_eq!(err.code(), 105);
}

#[test]
fn test_second_writer_is_locked_out() {
    let (_temp, path, mut first) = setup_created_file();
    first.open_file(&path, AccessMode::ReadWrite).unwrap();

    let mut second = test_store();
    let err = second.open_file(&path, AccessMode::ReadWrite).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Locked);
    assert_eq!(err.code(), 104);
    assert!(!second.is_open());

    first.close_file().unwrap();
    second.open_file(&path, AccessMode::ReadWrite).unwrap();
    assert!(second.is_writable());
}

#[test]
fn test_reader_is_locked_out_by_writer() {
    let (_temp, path, mut writer) = setup_created_file();
    writer.open_file(&path, AccessMode::ReadWrite).unwrap();

    let mut reader = test_store();
    let err = reader.open_file(&path, AccessMode::ReadOnly).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Locked);
}

#[test]
fn test_multiple_readers() {
    let (_temp, path, mut writer) = setup_created_file();
    writer.open_file(&path, AccessMode::ReadWrite).unwrap();
    writer.write_key("shared", &Value::from("yes")).unwrap();
    writer.close_file().unwrap();

    let mut reader1 = test_store();
    let mut reader2 = test_store();
    reader1.open_file(&path, AccessMode::ReadOnly).unwrap();
    reader2.open_file(&path, AccessMode::ReadOnly).unwrap();

    assert_eq!(reader1.read_key("shared").unwrap(), Value::from("yes"));
    assert_eq!(reader2.read_key("shared").unwrap(), Value::from("yes"));
}

#[test]
fn test_open_while_open_closes_previous() {
    let temp_dir = TempDir::new().unwrap();
    let path_a = temp_dir.path().join("a.db");
    let path_b = temp_dir.path().join("b.db");
    let mut store = test_store();
    store.create_file(&path_a).unwrap();
    store.create_file(&path_b).unwrap();

    store.open_file(&path_a, AccessMode::ReadWrite).unwrap();
    store.write_key("from_a", &Value::Int(1)).unwrap();
    store.open_file(&path_b, AccessMode::ReadOnly).unwrap();

    assert_eq!(store.path(), Some(path_b.as_path()));

    // Writes to a.db were committed when it was closed
    store.open_file(&path_a, AccessMode::ReadOnly).unwrap();
    assert_eq!(store.read_key("from_a").unwrap(), Value::Int(1));
}

// =============================================================================
// Commit / Close Tests
// =============================================================================

#[test]
fn test_close_commits() {
    let (_temp, path, mut store) = setup_created_file();
    store.open_file(&path, AccessMode::ReadWrite).unwrap();
    store.write_key("count", &Value::Int(42)).unwrap();

    store.close_file().unwrap();

    assert_eq!(store.file_status(), FileStatus::Closed);
    assert_eq!(store.lock_status(), LockStatus::Unlocked);
    assert_eq!(store.path(), None);

    store.open_file(&path, AccessMode::ReadOnly).unwrap();
    assert_eq!(store.read_key("count").unwrap(), Value::Int(42));
}

#[test]
fn test_close_twice_is_ok() {
    let (_temp, path, mut store) = setup_created_file();
    store.open_file(&path, AccessMode::ReadOnly).unwrap();

    store.close_file().unwrap();
    store.close_file().unwrap();

    let mut never_opened = test_store();
    never_opened.close_file().unwrap();
}

#[test]
fn test_dropped_handle_rolls_back() {
    let (_temp, path, _store) = setup_created_file();
    {
        let mut writer = test_store();
        writer.open_file(&path, AccessMode::ReadWrite).unwrap();
        writer.write_key("lost", &Value::from("never committed")).unwrap();
        // dropped without close_file
    }

    let mut reader = test_store();
    reader.open_file(&path, AccessMode::ReadOnly).unwrap();

    assert!(!reader.check_key("lost").unwrap());
    assert_eq!(reader.read_key("lost").unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn test_commit_persists_and_keeps_lock() {
    let (_temp, path, _store) = setup_created_file();
    {
        let mut writer = test_store();
        writer.open_file(&path, AccessMode::ReadWrite).unwrap();
        writer.write_key("kept", &Value::Int(1)).unwrap();
        writer.commit_file().unwrap();

        assert!(writer.is_writable());
        writer.write_key("lost", &Value::Int(2)).unwrap();

        // Still exclusive after commit
        let mut other = test_store();
        assert_eq!(
            other
                .open_file(&path, AccessMode::ReadWrite)
                .unwrap_err()
                .kind(),
            ErrorKind::Locked
        );
    }

    let mut reader = test_store();
    reader.open_file(&path, AccessMode::ReadOnly).unwrap();

    assert!(reader.check_key("kept").unwrap());
    assert!(!reader.check_key("lost").unwrap());
}

#[test]
fn test_commit_read_only_is_noop() {
    let (_temp, path, mut store) = setup_created_file();
    store.open_file(&path, AccessMode::ReadOnly).unwrap();

    store.commit_file().unwrap();

    assert_eq!(store.lock_status(), LockStatus::Unlocked);
}

#[test]
fn test_commit_without_handle() {
    let mut store = test_store();

    let err = store.commit_file().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoHandleOpen);
    assert_eq!(err.code(), 102);
}

#[test]
fn test_with_file_commits_on_success() {
    let (_temp, path, mut store) = setup_created_file();

    let written = store
        .with_file(&path, AccessMode::ReadWrite, |s| {
            s.write_key("a", &Value::Int(1))?;
            s.write_key("b", &Value::Int(2))?;
            s.key_count()
        })
        .unwrap();

    assert_eq!(written, 2);
    assert!(!store.is_open());

    let all = store
        .with_file(&path, AccessMode::ReadOnly, |s| s.read_all_keys())
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn test_with_file_rolls_back_on_error() {
    let (_temp, path, mut store) = setup_created_file();

    let err = store
        .with_file(&path, AccessMode::ReadWrite, |s| {
            s.write_key("a", &Value::Int(1))?;
            s.write_key("a", &Value::Int(2))
        })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert!(!store.is_open());

    let exists = store
        .with_file(&path, AccessMode::ReadOnly, |s| s.check_key("a"))
        .unwrap();
    assert!(!exists);
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_delete_file() {
    let (_temp, path, store) = setup_created_file();

    store.delete_file(&path).unwrap();

    assert!(!path.exists());
    assert_eq!(store.check_file(&path), FileCheck::Absent);
}

#[test]
fn test_delete_missing_file_is_ok() {
    let (_temp, path) = setup_temp_file("missing.db");
    let store = test_store();

    store.delete_file(&path).unwrap();
    store.delete_file(&path).unwrap();
}

#[test]
fn test_delete_locked_file_fails() {
    let (_temp, path, mut writer) = setup_created_file();
    writer.open_file(&path, AccessMode::ReadWrite).unwrap();
    writer.write_key("keep", &Value::Bool(true)).unwrap();

    let deleter = test_store();
    let err = deleter.delete_file(&path).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Locked);
    assert!(path.exists());

    writer.close_file().unwrap();
    writer.open_file(&path, AccessMode::ReadOnly).unwrap();
    assert_eq!(writer.read_key("keep").unwrap(), Value::Bool(true));
}

#[test]
fn test_delete_foreign_database_fails_untouched() {
    let (_temp, path) = setup_temp_file("other.db");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute("CREATE TABLE users (id INTEGER PRIMARY KEY)", [])
            .unwrap();
    }
    let store = test_store();

    assert!(store.delete_file(&path).is_err());
    assert!(path.exists());
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_default_config() {
    let store = Store::default();

    assert_eq!(store.error_mode(), ErrorMode::Raise);
    assert_eq!(store.busy_timeout_ms(), 1500);
}

#[test]
fn test_config_accessors() {
    let (_temp, path, mut store) = setup_created_file();

    store.set_error_mode(ErrorMode::Raise);
    assert_eq!(store.error_mode(), ErrorMode::Raise);
    store.set_error_mode(ErrorMode::Return);
    assert_eq!(store.config().error_mode, ErrorMode::Return);

    store.set_busy_timeout_ms(3000).unwrap();
    assert_eq!(store.busy_timeout_ms(), 3000);

    // Applies to an open handle as well
    store.open_file(&path, AccessMode::ReadOnly).unwrap();
    store.set_busy_timeout_ms(25).unwrap();
    assert_eq!(store.config().busy_timeout_ms, 25);
}
