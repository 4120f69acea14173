//! Multi-row INSERT statements in three conflict flavours.
//!
//! | dialect    | `InsertIgnoreDuplicates`       | `Upsert`                            |
//! |------------|--------------------------------|-------------------------------------|
//! | sqlite     | `INSERT OR IGNORE`             | `INSERT OR REPLACE`                 |
//! | mysql      | `INSERT IGNORE`                | `... ON DUPLICATE KEY UPDATE`       |
//! | postgresql | `... ON CONFLICT DO NOTHING`   | `... ON CONFLICT (..) DO UPDATE`    |

use crate::dialect::Dialect;
use crate::literal::render_column_value;
use serde::{Deserialize, Serialize};
use sqlbatch_core::{ColumnValue, ConfigErrorKind, Error, ParamRow, Result, TableInfo, Value};
use std::fmt;

/// How an INSERT treats rows that collide with stored ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertKind {
    /// Plain INSERT; a collision is an error.
    Insert,
    /// Colliding rows are skipped.
    #[default]
    InsertIgnoreDuplicates,
    /// Colliding rows are overwritten.
    Upsert,
}

impl InsertKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            InsertKind::Insert => "insert",
            InsertKind::InsertIgnoreDuplicates => "insert_ignore_duplicates",
            InsertKind::Upsert => "upsert",
        }
    }
}

impl fmt::Display for InsertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prepared INSERT shape for one table, ready to render row batches.
#[derive(Debug, Clone)]
pub struct InsertStatement {
    table: &'static str,
    kind: InsertKind,
    dialect: Dialect,
    /// Columns never overwritten by an upsert.
    key_columns: Vec<&'static str>,
    /// Postgres `ON CONFLICT (..)` target for upserts.
    conflict_target: Vec<&'static str>,
}

/// Prepare an INSERT of `kind` into `table` for `dialect`.
///
/// Fails for a postgres upsert into a table with neither a unique column nor
/// a primary key, since `ON CONFLICT DO UPDATE` needs a target.
pub fn build(kind: InsertKind, table: &TableInfo, dialect: Dialect) -> Result<InsertStatement> {
    let key_columns: Vec<_> = table.primary_key().map(|c| c.name).collect();
    let conflict_target = match table.unique_columns().next() {
        Some(unique) => vec![unique.name],
        None => key_columns.clone(),
    };
    if kind == InsertKind::Upsert && dialect == Dialect::Postgres && conflict_target.is_empty() {
        return Err(Error::config(
            ConfigErrorKind::UnsupportedStatement,
            format!(
                "table '{}' has no unique column or primary key to upsert on",
                table.name
            ),
        ));
    }
    Ok(InsertStatement {
        table: table.name,
        kind,
        dialect,
        key_columns,
        conflict_target,
    })
}

impl InsertStatement {
    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn kind(&self) -> InsertKind {
        self.kind
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn head(&self, columns: &[&'static str]) -> String {
        let verb = match (self.kind, self.dialect) {
            (InsertKind::InsertIgnoreDuplicates, Dialect::Sqlite) => "INSERT OR IGNORE INTO",
            (InsertKind::InsertIgnoreDuplicates, Dialect::Mysql) => "INSERT IGNORE INTO",
            (InsertKind::Upsert, Dialect::Sqlite) => "INSERT OR REPLACE INTO",
            _ => "INSERT INTO",
        };
        let cols: Vec<_> = columns
            .iter()
            .map(|c| self.dialect.quote_identifier(c))
            .collect();
        format!(
            "{} {} ({}) VALUES ",
            verb,
            self.dialect.quote_identifier(self.table),
            cols.join(", ")
        )
    }

    fn tail(&self, columns: &[&'static str]) -> String {
        match (self.kind, self.dialect) {
            (InsertKind::InsertIgnoreDuplicates, Dialect::Postgres) => {
                " ON CONFLICT DO NOTHING".to_string()
            }
            (InsertKind::Upsert, Dialect::Postgres) => {
                let target: Vec<_> = self
                    .conflict_target
                    .iter()
                    .map(|c| self.dialect.quote_identifier(c))
                    .collect();
                let updates: Vec<_> = columns
                    .iter()
                    .filter(|c| !self.conflict_target.contains(*c) && !self.key_columns.contains(*c))
                    .map(|c| {
                        let q = self.dialect.quote_identifier(c);
                        format!("{q} = EXCLUDED.{q}")
                    })
                    .collect();
                if updates.is_empty() {
                    format!(" ON CONFLICT ({}) DO NOTHING", target.join(", "))
                } else {
                    format!(
                        " ON CONFLICT ({}) DO UPDATE SET {}",
                        target.join(", "),
                        updates.join(", ")
                    )
                }
            }
            (InsertKind::Upsert, Dialect::Mysql) => {
                let mut updates: Vec<_> = columns
                    .iter()
                    .filter(|c| !self.key_columns.contains(*c))
                    .map(|c| {
                        let q = self.dialect.quote_identifier(c);
                        format!("{q} = VALUES({q})")
                    })
                    .collect();
                if updates.is_empty() {
                    // Nothing to overwrite; a self-assignment keeps the row.
                    if let Some(first) = columns.first() {
                        let q = self.dialect.quote_identifier(first);
                        updates.push(format!("{q} = {q}"));
                    }
                }
                format!(" ON DUPLICATE KEY UPDATE {}", updates.join(", "))
            }
            _ => String::new(),
        }
    }

    /// Render a parameterized multi-row statement and its bound values.
    ///
    /// Every row must share one column layout and hold no deferred value.
    pub fn to_sql_params(&self, rows: &[&ParamRow]) -> Result<(String, Vec<Value>)> {
        let columns = shared_layout(self.table, rows)?;
        let mut params = Vec::with_capacity(rows.len() * columns.len());
        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let mut placeholders = Vec::with_capacity(columns.len());
            for value in row.values() {
                let bound = match value {
                    ColumnValue::Null => Value::Null,
                    ColumnValue::Concrete(v) => v.clone(),
                    ColumnValue::Deferred(_) => {
                        return Err(Error::Custom(format!(
                            "deferred value in parameterized insert into '{}'",
                            self.table
                        )));
                    }
                };
                params.push(bound);
                placeholders.push(self.dialect.placeholder(params.len()));
            }
            groups.push(format!("({})", placeholders.join(", ")));
        }
        let sql = format!(
            "{}{}{}",
            self.head(&columns),
            groups.join(", "),
            self.tail(&columns)
        );
        Ok((sql, params))
    }

    /// Render a statement with every value written inline, subqueries
    /// included.
    pub fn to_sql_embedded(&self, rows: &[&ParamRow]) -> Result<String> {
        let columns = shared_layout(self.table, rows)?;
        let groups: Vec<_> = rows
            .iter()
            .map(|row| {
                let literals: Vec<_> = row
                    .values()
                    .map(|v| render_column_value(self.dialect, v))
                    .collect();
                format!("({})", literals.join(", "))
            })
            .collect();
        Ok(format!(
            "{}{}{}",
            self.head(&columns),
            groups.join(", "),
            self.tail(&columns)
        ))
    }
}

fn shared_layout(table: &str, rows: &[&ParamRow]) -> Result<Vec<&'static str>> {
    let first = rows
        .first()
        .ok_or_else(|| Error::Custom(format!("insert into '{}' without rows", table)))?;
    let layout = first.layout();
    if layout.is_empty() {
        return Err(Error::Custom(format!(
            "insert into '{}' without columns",
            table
        )));
    }
    if rows[1..].iter().any(|r| r.layout() != layout) {
        return Err(Error::Custom(format!(
            "rows inserted into '{}' by one statement must share a column layout",
            table
        )));
    }
    Ok(layout)
}
