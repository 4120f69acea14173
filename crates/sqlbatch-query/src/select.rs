//! Natural-key lookups used by deduplication.

use crate::dialect::Dialect;
use sqlbatch_core::{TableInfo, Value};

/// Rows fetched per lookup: two are enough to tell a unique match from an
/// ambiguous one.
pub const LOOKUP_LIMIT: usize = 2;

/// Build `SELECT <all columns> FROM table WHERE k1 = ? AND ... LIMIT 2`.
///
/// `filters` must be non-empty; an unfiltered lookup would match any row.
pub fn natural_key_lookup(
    dialect: Dialect,
    table: &TableInfo,
    filters: &[(&'static str, Value)],
) -> (String, Vec<Value>) {
    debug_assert!(!filters.is_empty());
    let columns: Vec<_> = table
        .columns
        .iter()
        .map(|c| dialect.quote_identifier(c.name))
        .collect();
    let predicate: Vec<_> = filters
        .iter()
        .enumerate()
        .map(|(i, (col, _))| {
            format!(
                "{} = {}",
                dialect.quote_identifier(col),
                dialect.placeholder(i + 1)
            )
        })
        .collect();
    let sql = format!(
        "SELECT {} FROM {} WHERE {} LIMIT {}",
        columns.join(", "),
        dialect.quote_identifier(table.name),
        predicate.join(" AND "),
        LOOKUP_LIMIT
    );
    let params = filters.iter().map(|(_, v)| v.clone()).collect();
    (sql, params)
}
