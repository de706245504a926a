//! Key operations
//!
//! Read, write, modify, delete and enumerate keys of the open file. Every
//! mutation runs inside the handle's ambient exclusive transaction and only
//! becomes durable on `commit_file` or `close_file`.

use std::collections::BTreeMap;

use super::{
    Handle, Store, COUNT_ROWS, DELETE_ROW, FORMAT_VERSION, INSERT_ROW, SELECT_ALL, SELECT_NAME,
    SELECT_VALUE, UPDATE_ROW,
};
use crate::backend::{EngineConnection, StorageEngine};
use crate::codec::{check_key_name, decode_value, encode_value, Value, RESERVED_KEY};
use crate::error::{Result, StorxError};

impl<E: StorageEngine> Store<E> {
    // =========================================================================
    // Reads
    // =========================================================================

    /// Read and decode the value stored under `name`
    ///
    /// The reserved metadata key reads as the format version string.
    pub fn read_key(&self, name: &str) -> Result<Value> {
        let result = self.read_key_inner(name);
        self.report(result)
    }

    fn read_key_inner(&self, name: &str) -> Result<Value> {
        if name == RESERVED_KEY {
            return Ok(Value::Text(FORMAT_VERSION.to_string()));
        }

        let handle = self.handle()?;
        match fetch_value(handle, name)? {
            Some(encoded) => decode_value(&encoded),
            None => Err(StorxError::KeyNotFound(name.to_string())),
        }
    }

    /// Like [`read_key`](Self::read_key), but returns
    /// [`Value::error_sentinel`] instead of an error
    ///
    /// A key that actually stores the sentinel reads the same as a failure.
    pub fn return_key(&self, name: &str) -> Value {
        self.read_key(name).unwrap_or_else(|e| {
            tracing::debug!("return_key({}) -> sentinel: {}", name, e);
            Value::error_sentinel()
        })
    }

    /// Decode every key except the metadata row
    pub fn read_all_keys(&self) -> Result<BTreeMap<String, Value>> {
        let result = self.read_all_keys_inner();
        self.report(result)
    }

    fn read_all_keys_inner(&self) -> Result<BTreeMap<String, Value>> {
        let handle = self.handle()?;
        let rows = handle
            .conn
            .query(SELECT_ALL, &[RESERVED_KEY])
            .map_err(|e| handle.engine_err(e))?;

        let mut output = BTreeMap::new();
        for row in rows {
            let mut columns = row.into_iter();
            let name = columns.next().flatten().unwrap_or_default();
            let encoded = columns.next().flatten().unwrap_or_default();
            output.insert(name, decode_value(&encoded)?);
        }

        Ok(output)
    }

    /// Whether `name` exists; the metadata key always does
    pub fn check_key(&self, name: &str) -> Result<bool> {
        let result = self.check_key_inner(name);
        self.report(result)
    }

    fn check_key_inner(&self, name: &str) -> Result<bool> {
        if name == RESERVED_KEY {
            return Ok(true);
        }

        let handle = self.handle()?;
        key_exists(handle, name)
    }

    /// Number of user keys in the open file
    pub fn key_count(&self) -> Result<usize> {
        let result = self.key_count_inner();
        self.report(result)
    }

    fn key_count_inner(&self) -> Result<usize> {
        let handle = self.handle()?;
        let count = handle
            .conn
            .count(COUNT_ROWS, &[RESERVED_KEY])
            .map_err(|e| handle.engine_err(e))?;

        Ok(count as usize)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert a new key; fails with `KeyExists` rather than overwrite
    pub fn write_key(&mut self, name: &str, value: &Value) -> Result<()> {
        let result = self.write_key_inner(name, value);
        self.report(result)
    }

    fn write_key_inner(&self, name: &str, value: &Value) -> Result<()> {
        if name == RESERVED_KEY {
            return Err(StorxError::ReservedName);
        }

        let handle = self.writable_handle()?;
        validate_name(name)?;

        if key_exists(handle, name)? {
            return Err(StorxError::KeyExists(name.to_string()));
        }

        let encoded = encode_value(value)?;
        handle
            .conn
            .exec(INSERT_ROW, &[name, encoded.as_str()])
            .map_err(|e| handle.engine_err(e))?;

        tracing::debug!("write_key {} ({} bytes encoded)", name, encoded.len());
        Ok(())
    }

    /// Insert or overwrite `name`
    pub fn modify_key(&mut self, name: &str, value: &Value) -> Result<()> {
        let result = self.modify_key_inner(name, value);
        self.report(result)
    }

    fn modify_key_inner(&self, name: &str, value: &Value) -> Result<()> {
        if name == RESERVED_KEY {
            return Err(StorxError::ReservedName);
        }

        let handle = self.writable_handle()?;
        validate_name(name)?;
        upsert(handle, name, value)
    }

    /// Apply `modify_key` to every entry, in iteration order
    ///
    /// Entries named with the metadata key are skipped. The batch is not
    /// atomic: if an entry fails, the ones before it stay applied in the open
    /// transaction. Returns the number of entries written.
    pub fn modify_multiple_keys<I, K>(&mut self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let result = self.modify_multiple_keys_inner(entries);
        self.report(result)
    }

    fn modify_multiple_keys_inner<I, K>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let handle = self.writable_handle()?;

        let mut written = 0;
        for (name, value) in entries {
            let name = name.as_ref();
            if name == RESERVED_KEY {
                continue;
            }

            validate_name(name)?;
            upsert(handle, name, &value)?;
            written += 1;
        }

        tracing::debug!("modify_multiple_keys wrote {} keys", written);
        Ok(written)
    }

    /// Remove `name`; removing a missing key succeeds
    pub fn delete_key(&mut self, name: &str) -> Result<()> {
        let result = self.delete_key_inner(name);
        self.report(result)
    }

    fn delete_key_inner(&self, name: &str) -> Result<()> {
        if name == RESERVED_KEY {
            return Err(StorxError::ReservedName);
        }

        let handle = self.writable_handle()?;
        let removed = handle
            .conn
            .exec(DELETE_ROW, &[name])
            .map_err(|e| handle.engine_err(e))?;

        tracing::debug!("delete_key {} (removed {})", name, removed);
        Ok(())
    }
}

// =============================================================================
// Row Helpers
// =============================================================================

fn validate_name(name: &str) -> Result<()> {
    if check_key_name(name) {
        Ok(())
    } else {
        Err(StorxError::InvalidName(name.to_string()))
    }
}

fn key_exists<C: EngineConnection>(handle: &Handle<C>, name: &str) -> Result<bool> {
    let rows = handle
        .conn
        .query(SELECT_NAME, &[name])
        .map_err(|e| handle.engine_err(e))?;
    Ok(!rows.is_empty())
}

/// Stored text for `name`; a NULL cell comes back empty and fails to decode
fn fetch_value<C: EngineConnection>(handle: &Handle<C>, name: &str) -> Result<Option<String>> {
    let rows = handle
        .conn
        .query(SELECT_VALUE, &[name])
        .map_err(|e| handle.engine_err(e))?;

    Ok(rows
        .into_iter()
        .next()
        .map(|row| row.into_iter().next().flatten().unwrap_or_default()))
}

fn upsert<C: EngineConnection>(handle: &Handle<C>, name: &str, value: &Value) -> Result<()> {
    let encoded = encode_value(value)?;
    let statement = if key_exists(handle, name)? {
        UPDATE_ROW
    } else {
        INSERT_ROW
    };

    handle
        .conn
        .exec(statement, &[name, encoded.as_str()])
        .map_err(|e| handle.engine_err(e))?;

    tracing::trace!("modify_key {} ({} bytes encoded)", name, encoded.len());
    Ok(())
}
