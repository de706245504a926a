//! Error types for StorX
//!
//! Provides a unified error type for all operations, plus the coarse
//! [`ErrorKind`] taxonomy callers usually match on.

use thiserror::Error;

use crate::backend::{EngineError, EngineErrorKind};

/// Result type alias using StorxError
pub type Result<T> = std::result::Result<T, StorxError>;

/// Unified error type for StorX operations
#[derive(Debug, Error)]
pub enum StorxError {
    // -------------------------------------------------------------------------
    // File Errors
    // -------------------------------------------------------------------------
    #[error("file [{0}] does not exist")]
    FileNotFound(String),

    #[error("unable to create file [{0}]: it already exists")]
    FileExists(String),

    #[error("file [{0}] is locked")]
    Locked(String),

    #[error("file [{0}] is not of matching StorX version")]
    FormatMismatch(String),

    // -------------------------------------------------------------------------
    // Handle Errors
    // -------------------------------------------------------------------------
    #[error("no file open")]
    NoHandleOpen,

    #[error("file [{0}] not locked for writing")]
    NotWritable(String),

    // -------------------------------------------------------------------------
    // Key Errors
    // -------------------------------------------------------------------------
    #[error("key [{0}] doesn't exist")]
    KeyNotFound(String),

    #[error("key [{0}] already exists")]
    KeyExists(String),

    #[error("invalid key name [{0}]")]
    InvalidName(String),

    #[error("the metadata key is reserved")]
    ReservedName,

    // -------------------------------------------------------------------------
    // Backend Errors
    // -------------------------------------------------------------------------
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure taxonomy shared by every operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Locked,
    NoHandleOpen,
    NotWritable,
    InvalidName,
    ReservedName,
    FormatMismatch,
    BackendFailure,
    IoFailure,
}

impl StorxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorxError::FileNotFound(_) | StorxError::KeyNotFound(_) => ErrorKind::NotFound,
            StorxError::FileExists(_) | StorxError::KeyExists(_) => ErrorKind::AlreadyExists,
            StorxError::Locked(_) => ErrorKind::Locked,
            StorxError::NoHandleOpen => ErrorKind::NoHandleOpen,
            StorxError::NotWritable(_) => ErrorKind::NotWritable,
            StorxError::InvalidName(_) => ErrorKind::InvalidName,
            StorxError::ReservedName => ErrorKind::ReservedName,
            StorxError::FormatMismatch(_) => ErrorKind::FormatMismatch,
            StorxError::Engine(_) | StorxError::Serialization(_) => ErrorKind::BackendFailure,
            StorxError::Io(_) => ErrorKind::IoFailure,
        }
    }

    /// Numeric status code, stable across versions of the file format
    pub fn code(&self) -> u16 {
        match self {
            StorxError::FileNotFound(_) => 101,
            StorxError::NoHandleOpen => 102,
            StorxError::NotWritable(_) => 103,
            StorxError::Locked(_) => 104,
            StorxError::FormatMismatch(_) => 105,
            StorxError::FileExists(_) => 106,
            StorxError::Io(_) => 107,
            StorxError::KeyNotFound(_) => 201,
            StorxError::KeyExists(_) => 202,
            StorxError::InvalidName(_) => 203,
            StorxError::Engine(_) | StorxError::Serialization(_) => 300,
            StorxError::ReservedName => 666,
        }
    }

    /// Faults that are not an expected outcome of the call
    ///
    /// Only these are subject to [`ErrorMode::Raise`](crate::config::ErrorMode).
    pub fn is_fault(&self) -> bool {
        matches!(self.kind(), ErrorKind::BackendFailure | ErrorKind::IoFailure)
    }

    /// Map an engine error, turning lock contention into [`StorxError::Locked`]
    pub(crate) fn from_engine(err: EngineError, path: &str) -> Self {
        match err.kind() {
            EngineErrorKind::Busy => StorxError::Locked(path.to_string()),
            _ => StorxError::Engine(err),
        }
    }
}

impl From<bincode::Error> for StorxError {
    fn from(err: bincode::Error) -> Self {
        StorxError::Serialization(err.to_string())
    }
}
