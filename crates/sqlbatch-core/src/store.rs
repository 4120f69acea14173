//! The store abstraction the engine writes through.
//!
//! Implementations execute SQL synchronously on a single connection and
//! expose explicit transaction control, so the engine can commit table by
//! table.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;
use std::sync::Arc;

/// A relational store reachable through one connection.
///
/// Methods take `&self`; implementations guard their connection internally.
pub trait Store: Send + Sync {
    /// Short backend name used in logs (`"sqlite"`, `"postgresql"`, ...).
    fn backend_name(&self) -> &'static str;

    /// Run a query and collect every result row.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a statement, returning the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    /// Can commits run on a worker thread while other writers are active?
    ///
    /// Embedded single-writer stores answer `false` and are committed inline.
    fn supports_concurrent_writers(&self) -> bool {
        false
    }
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }

    fn begin(&self) -> Result<()> {
        (**self).begin()
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<()> {
        (**self).rollback()
    }

    fn supports_concurrent_writers(&self) -> bool {
        (**self).supports_concurrent_writers()
    }
}
