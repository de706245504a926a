//! # StorX
//!
//! A single-file, transactional key-value store with:
//! - Schema-free structured values under validated key names
//! - One exclusive writer per file, any number of concurrent readers
//! - All-or-nothing file creation and versioned format detection
//! - Writes that only become visible on commit or close
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                               │
//! │        (file lifecycle + key operations, one handle)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    Codec    │          │   Backend   │
//!   │ (Value, key │          │  (engine    │
//!   │  validation)│          │  adapter)   │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │   SQLite    │
//!                           │ (one file)  │
//!                           └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use storx::{AccessMode, Store, Value};
//!
//! let mut store = Store::default();
//! store.create_file("a.db")?;
//!
//! store.open_file("a.db", AccessMode::ReadWrite)?;
//! store.write_key("count", &Value::from(42))?;
//! store.close_file()?;
//!
//! store.open_file("a.db", AccessMode::ReadOnly)?;
//! assert_eq!(store.return_key("count"), Value::Int(42));
//! store.close_file()?;
//! # Ok::<(), storx::StorxError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod backend;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ErrorKind, Result, StorxError};
pub use config::{Config, ErrorMode};
pub use codec::{check_key_name, Value, RESERVED_KEY};
pub use store::{AccessMode, FileCheck, FileStatus, LockStatus, Store, FORMAT_VERSION};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of StorX
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
