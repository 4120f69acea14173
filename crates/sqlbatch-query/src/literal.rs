//! Rendering values as SQL literals.
//!
//! Used for values-embedded statements, where a deferred subquery sits next
//! to ordinary values and the whole row is written into the statement text.

use crate::dialect::Dialect;
use sqlbatch_core::value::{format_date, format_time, format_timestamp};
use sqlbatch_core::{ColumnValue, SubqueryExpr, Value};
use std::fmt::Write;

/// Quote a string literal, doubling single quotes. MySQL additionally
/// treats backslash as an escape character.
pub fn quote_string(dialect: Dialect, s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' if dialect == Dialect::Mysql => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Render text as a literal. Text holding a NUL byte cannot appear in
/// statement text and is written as a hex blob cast back to text.
fn render_text(dialect: Dialect, s: &str) -> String {
    if !s.contains('\0') {
        return quote_string(dialect, s);
    }
    match dialect {
        Dialect::Sqlite => format!("CAST(X'{}' AS TEXT)", hex(s.as_bytes())),
        Dialect::Mysql => format!("CAST(X'{}' AS CHAR)", hex(s.as_bytes())),
        // PostgreSQL text cannot hold NUL; the server rejects the literal
        Dialect::Postgres => quote_string(dialect, s),
    }
}

fn is_numeric_literal(s: &str) -> bool {
    !s.is_empty()
        && s.parse::<f64>().is_ok()
        && s.chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
}

/// Render a concrete value as a literal.
pub fn render_value(dialect: Dialect, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => match dialect {
            Dialect::Postgres => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            Dialect::Sqlite | Dialect::Mysql => (if *b { "1" } else { "0" }).to_string(),
        },
        Value::Int(v) => v.to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::Double(v) if v.is_finite() => format!("{:?}", v),
        Value::Double(v) => quote_string(dialect, &v.to_string()),
        Value::Decimal(s) if is_numeric_literal(s) => s.clone(),
        Value::Decimal(s) | Value::Text(s) => render_text(dialect, s),
        Value::Bytes(b) => match dialect {
            Dialect::Postgres => format!("'\\x{}'::bytea", hex(b)),
            Dialect::Sqlite | Dialect::Mysql => format!("X'{}'", hex(b)),
        },
        Value::Date(days) => quote_string(dialect, &format_date(*days)),
        Value::Time(micros) => quote_string(dialect, &format_time(*micros)),
        Value::Timestamp(micros) => quote_string(dialect, &format_timestamp(*micros)),
        Value::Json(j) => render_text(dialect, &j.to_string()),
    }
}

/// Render a deferred key lookup as a scalar subquery.
///
/// `LIMIT 1` keeps the subquery scalar when several stored rows share the
/// natural key; the first row wins, as in deduplication.
pub fn render_subquery(dialect: Dialect, subquery: &SubqueryExpr) -> String {
    let predicate = subquery
        .filters
        .iter()
        .map(|(col, value)| {
            format!(
                "{} = {}",
                dialect.quote_identifier(col),
                render_value(dialect, value)
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(
        "(SELECT {} FROM {} WHERE {} LIMIT 1)",
        dialect.quote_identifier(subquery.select_column),
        dialect.quote_identifier(subquery.table),
        predicate
    )
}

pub fn render_column_value(dialect: Dialect, value: &ColumnValue) -> String {
    match value {
        ColumnValue::Null => "NULL".to_string(),
        ColumnValue::Concrete(v) => render_value(dialect, v),
        ColumnValue::Deferred(subquery) => render_subquery(dialect, subquery),
    }
}
