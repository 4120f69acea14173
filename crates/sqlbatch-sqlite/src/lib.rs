//! SQLite store for sqlbatch.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! Implements the `Store` trait from sqlbatch-core over a single libsqlite3
//! connection, with explicit transactions so the commit engine can commit
//! table by table.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlbatch_sqlite::SqliteStore;
//! use sqlbatch_core::{Store, Value};
//!
//! let store = SqliteStore::open_url("sqlite:///quotes.db")?;
//! store.execute_raw("CREATE TABLE tag (id INTEGER PRIMARY KEY, name TEXT UNIQUE)")?;
//! store.execute("INSERT INTO tag (name) VALUES (?1)", &[Value::from("change")])?;
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite Type |
//! |-------|-------------|
//! | `Bool` | INTEGER (0/1) |
//! | `Int`, `BigInt` | INTEGER |
//! | `Double` | REAL |
//! | `Text`, `Decimal` | TEXT |
//! | `Bytes` | BLOB |
//! | `Null` | NULL |
//! | `Date`, `Time`, `Timestamp` | TEXT (ISO-8601) |
//! | `Json` | TEXT |
//!
//! Temporal values are read back as temporal values when the column is
//! declared `DATE`, `TIME`, `DATETIME` or `TIMESTAMP`.

pub mod connection;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteStore};

/// The linked SQLite library version.
pub fn sqlite_version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static NUL-terminated string
    unsafe { std::ffi::CStr::from_ptr(libsqlite3_sys::sqlite3_libversion()) }
        .to_str()
        .unwrap_or("unknown")
}
