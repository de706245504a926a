//! File lifecycle operations
//!
//! Create, probe, open, commit, close and delete store files.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

use super::{
    AccessMode, FileCheck, Handle, LockStatus, Store, CREATE_TABLE, DROP_TABLE, FORMAT_VERSION,
    INSERT_ROW, SELECT_VALUE, TABLE,
};
use crate::backend::{EngineConnection, EngineError, OpenMode, StorageEngine};
use crate::codec::RESERVED_KEY;
use crate::error::{Result, StorxError};

impl<E: StorageEngine> Store<E> {
    // =========================================================================
    // Create / Check / Delete
    // =========================================================================

    /// Create a new, empty store file at `path`
    ///
    /// Never overwrites: the path is claimed atomically and the call fails with
    /// `FileExists` if anything is already there. Creation is all-or-nothing;
    /// on any later failure the file this call claimed is removed.
    pub fn create_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let result = self.create_file_inner(path.as_ref());
        self.report(result)
    }

    fn create_file_inner(&self, path: &Path) -> Result<()> {
        let file = path.display().to_string();

        // Claim the path first; whoever else gets there first owns it
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StorxError::FileExists(file));
            }
            Err(e) => return Err(e.into()),
        }

        let conn = match self
            .engine
            .open(path, OpenMode::Create, self.config.busy_timeout_ms)
        {
            Ok(conn) => conn,
            Err(e) => {
                discard_created(path, &file);
                return Err(StorxError::from_engine(e, &file));
            }
        };

        let initialized = conn
            .begin_exclusive()
            .and_then(|_| conn.exec(CREATE_TABLE, &[]))
            .and_then(|_| conn.exec(INSERT_ROW, &[RESERVED_KEY, FORMAT_VERSION]))
            .and_then(|_| conn.commit());

        if let Err(e) = initialized {
            let _ = conn.close();
            discard_created(path, &file);
            return Err(StorxError::from_engine(e, &file));
        }

        conn.close().map_err(|e| StorxError::from_engine(e, &file))?;

        tracing::info!("Created store file {} (format v{})", file, FORMAT_VERSION);
        Ok(())
    }

    /// Probe what is at `path` without modifying it
    pub fn check_file(&self, path: impl AsRef<Path>) -> FileCheck {
        let path = path.as_ref();
        let status = self.probe(path);
        tracing::debug!("check_file {}: {:?}", path.display(), status);
        status
    }

    fn probe(&self, path: &Path) -> FileCheck {
        if !path.exists() {
            return FileCheck::Absent;
        }

        let conn = match self
            .engine
            .open(path, OpenMode::ReadOnly, self.config.busy_timeout_ms)
        {
            Ok(conn) => conn,
            Err(e) => return classify_probe_error(&e),
        };

        let status = probe_connection(&conn);

        if let Err(e) = conn.close() {
            tracing::debug!("Probe connection for {} did not close cleanly: {}", path.display(), e);
        }

        status
    }

    /// Delete the store file at `path`
    ///
    /// A missing file counts as success. The file must not be locked by another
    /// writer; anything failing before the drop is committed leaves it untouched.
    pub fn delete_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let result = self.delete_file_inner(path.as_ref());
        self.report(result)
    }

    fn delete_file_inner(&self, path: &Path) -> Result<()> {
        let file = path.display().to_string();

        if !path.exists() {
            return Ok(());
        }

        let conn = match self
            .engine
            .open(path, OpenMode::ReadWrite, self.config.busy_timeout_ms)
        {
            Ok(conn) => conn,
            // Lost a race with another deleter
            Err(_) if !path.exists() => return Ok(()),
            Err(e) => return Err(StorxError::from_engine(e, &file)),
        };

        let dropped = conn
            .begin_exclusive()
            .and_then(|_| conn.exec(DROP_TABLE, &[]))
            .and_then(|_| conn.commit());

        if let Err(e) = dropped {
            // Closing rolls back anything the transaction did
            let _ = conn.close();
            return Err(StorxError::from_engine(e, &file));
        }

        conn.close().map_err(|e| StorxError::from_engine(e, &file))?;
        fs::remove_file(path)?;

        tracing::info!("Deleted store file {}", file);
        Ok(())
    }

    // =========================================================================
    // Open / Commit / Close
    // =========================================================================

    /// Open `path` for use by the key operations
    ///
    /// The file must exist and be of the current format version. `ReadWrite`
    /// takes the exclusive write lock for as long as the handle stays open.
    /// An already open handle on this store is closed first.
    pub fn open_file(&mut self, path: impl AsRef<Path>, mode: AccessMode) -> Result<()> {
        let result = self.open_file_inner(path.as_ref(), mode);
        self.report(result)
    }

    fn open_file_inner(&mut self, path: &Path, mode: AccessMode) -> Result<()> {
        let file = path.display().to_string();

        if let Some(current) = &self.handle {
            tracing::debug!("Closing {} before opening {}", current.display(), file);
            self.close_file_inner()?;
        }

        if !path.exists() {
            return Err(StorxError::FileNotFound(file));
        }

        // One re-probe to ride out a transient lock
        let mut status = self.probe(path);
        if status != FileCheck::CurrentVersion {
            tracing::debug!("Probe of {} returned {:?}, retrying once", file, status);
            status = self.probe(path);
        }

        match status {
            FileCheck::CurrentVersion => {}
            FileCheck::Absent => return Err(StorxError::FileNotFound(file)),
            FileCheck::LockedContainer => return Err(StorxError::Locked(file)),
            _ => return Err(StorxError::FormatMismatch(file)),
        }

        let engine_mode = match mode {
            AccessMode::ReadOnly => OpenMode::ReadOnly,
            AccessMode::ReadWrite => OpenMode::ReadWrite,
        };

        let conn = self
            .engine
            .open(path, engine_mode, self.config.busy_timeout_ms)
            .map_err(|e| StorxError::from_engine(e, &file))?;

        let lock = match mode {
            AccessMode::ReadOnly => LockStatus::Unlocked,
            AccessMode::ReadWrite => {
                if let Err(e) = conn.begin_exclusive() {
                    let _ = conn.close();
                    return Err(StorxError::from_engine(e, &file));
                }
                LockStatus::WriteLocked
            }
        };

        self.handle = Some(Handle {
            path: path.to_path_buf(),
            conn,
            lock,
        });

        tracing::info!("Opened {} ({:?})", file, mode);
        Ok(())
    }

    /// Persist everything written so far and keep the write lock
    ///
    /// No-op on a read-only handle.
    pub fn commit_file(&mut self) -> Result<()> {
        let result = self.commit_file_inner();
        self.report(result)
    }

    fn commit_file_inner(&mut self) -> Result<()> {
        let handle = self.handle.as_mut().ok_or(StorxError::NoHandleOpen)?;

        if handle.lock == LockStatus::Unlocked {
            return Ok(());
        }

        handle.conn.commit().map_err(|e| handle.engine_err(e))?;

        // The lock is released between COMMIT and BEGIN; another writer can win
        if let Err(e) = handle.conn.begin_exclusive() {
            handle.lock = LockStatus::Unlocked;
            tracing::warn!("Lost write lock on {} after commit: {}", handle.display(), e);
            return Err(handle.engine_err(e));
        }

        tracing::debug!("Committed {}", handle.display());
        Ok(())
    }

    /// Close the open file, committing pending writes first
    ///
    /// The handle is torn down even if the commit fails. Closing an already
    /// closed store succeeds.
    pub fn close_file(&mut self) -> Result<()> {
        let result = self.close_file_inner();
        self.report(result)
    }

    fn close_file_inner(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let file = handle.display();

        let committed = match handle.lock {
            LockStatus::WriteLocked => handle.conn.commit(),
            LockStatus::Unlocked => Ok(()),
        };
        let closed = handle.conn.close();

        committed.map_err(|e| StorxError::from_engine(e, &file))?;
        closed.map_err(|e| StorxError::from_engine(e, &file))?;

        tracing::info!("Closed {}", file);
        Ok(())
    }

    /// Open `path`, run `f`, then close
    ///
    /// If `f` fails the handle is released without committing and `f`'s error
    /// is returned.
    pub fn with_file<T, F>(&mut self, path: impl AsRef<Path>, mode: AccessMode, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.open_file(path, mode)?;

        match f(self) {
            Ok(value) => {
                self.close_file()?;
                Ok(value)
            }
            Err(e) => {
                self.abandon();
                Err(e)
            }
        }
    }

    /// Release the handle without committing
    fn abandon(&mut self) {
        if let Some(handle) = self.handle.take() {
            let file = handle.display();
            if let Err(e) = handle.conn.close() {
                tracing::warn!("Failed to release {}: {}", file, e);
            }
            tracing::debug!("Abandoned {}; uncommitted changes rolled back", file);
        }
    }
}

/// Read the metadata row through an already open connection
fn probe_connection<C: EngineConnection>(conn: &C) -> FileCheck {
    match conn.table_exists(TABLE) {
        Ok(true) => {}
        Ok(false) => return FileCheck::UnrecognizedContainer,
        Err(e) => return classify_probe_error(&e),
    }

    let rows = match conn.query(SELECT_VALUE, &[RESERVED_KEY]) {
        Ok(rows) => rows,
        Err(e) => return classify_probe_error(&e),
    };

    match rows.into_iter().next().and_then(|row| row.into_iter().next().flatten()) {
        None => FileCheck::UnrecognizedContainer,
        Some(version) if version == FORMAT_VERSION => FileCheck::CurrentVersion,
        Some(_) => FileCheck::OtherVersion,
    }
}

/// Remove a file claimed by a failed `create_file`
fn discard_created(path: &Path, file: &str) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("Failed to remove partially created {}: {}", file, e);
    }
}

fn classify_probe_error(err: &EngineError) -> FileCheck {
    if err.is_busy() {
        FileCheck::LockedContainer
    } else {
        FileCheck::NotAContainer
    }
}
