//! Flush planning and execution.
//!
//! A commit resolves every staged entity into rows, groups the rows by
//! table, and writes tables in dependency order. Each table is written in its
//! own transaction: a failure leaves earlier tables committed and later
//! tables untouched.

use crate::context::CommitContext;
use crate::order::TableOrder;
use crate::resolve::resolve_entity;
use sqlbatch_core::{
    ConfigErrorKind, EntityRef, Error, ExecutionError, ParamRow, Result, Store,
};
use sqlbatch_query::{InsertKind, InsertStatement, build, render_column_value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

/// Phases of a bulk commit. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitPhase {
    #[default]
    Collecting,
    Resolving,
    Flushing,
    Done,
    Failed,
}

/// How a table's rows were sent to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementShape {
    /// Bound parameters.
    Parameterized,
    /// Literals and subqueries written into the statement text.
    Embedded,
}

impl fmt::Display for StatementShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementShape::Parameterized => f.write_str("parameterized"),
            StatementShape::Embedded => f.write_str("embedded"),
        }
    }
}

/// Outcome of flushing one table.
#[derive(Debug, Clone)]
pub struct TableReport {
    pub table: &'static str,
    /// Rows sent.
    pub rows: usize,
    /// Rows the store reported as affected; ignored duplicates are not counted.
    pub affected: u64,
    pub statements: usize,
    pub shape: StatementShape,
    pub kind: InsertKind,
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, Default)]
pub struct CommitReport {
    /// Flushed tables, in the order they were written.
    pub tables: Vec<TableReport>,
    pub elapsed: Duration,
    /// Staged entities covered by the commit.
    pub entities: usize,
}

impl CommitReport {
    pub fn rows_for(&self, table: &str) -> usize {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .map_or(0, |t| t.rows)
    }

    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }

    pub fn statements(&self) -> usize {
        self.tables.iter().map(|t| t.statements).sum()
    }

    pub fn table(&self, table: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == table)
    }
}

/// Rows to write, grouped by table in dependency order.
#[derive(Debug, Default)]
pub struct FlushPlan {
    tables: Vec<(&'static str, Vec<ParamRow>)>,
    /// Entities whose own row is written with each table.
    owners: HashMap<&'static str, Vec<EntityRef>>,
}

impl FlushPlan {
    /// Resolve `staged` into rows. Fails before anything is written.
    pub fn build<S: Store + ?Sized>(
        ctx: &CommitContext<'_, S>,
        order: &TableOrder,
        staged: &[EntityRef],
    ) -> Result<Self> {
        let mut rows: HashMap<&'static str, Vec<ParamRow>> = HashMap::new();
        let mut owners: HashMap<&'static str, Vec<EntityRef>> = HashMap::new();
        let mut seen_joins: HashSet<String> = HashSet::new();

        for handle in staged {
            let entity = handle.read();
            let resolved = resolve_entity(ctx, &entity)?;
            let table = entity.table_name();
            drop(entity);

            if let Some(own) = resolved.own {
                if own.is_empty() {
                    tracing::warn!(table = table, "skipping entity without any column value");
                } else {
                    rows.entry(table).or_default().push(own);
                    owners.entry(table).or_default().push(handle.clone());
                }
            }
            for (join_table, row) in resolved.joins {
                if seen_joins.insert(join_key(ctx, join_table, &row)) {
                    rows.entry(join_table).or_default().push(row);
                }
            }
        }

        let tables = order
            .tables()
            .iter()
            .filter_map(|t| rows.remove(t).map(|r| (*t, r)))
            .collect();
        Ok(Self { tables, owners })
    }

    /// Tables with pending rows, in write order.
    pub fn tables(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tables.iter().map(|(t, _)| *t)
    }

    pub fn rows(&self, table: &str) -> &[ParamRow] {
        self.tables
            .iter()
            .find(|(t, _)| *t == table)
            .map_or(&[], |(_, r)| r.as_slice())
    }

    /// Entities written by `table`'s statements.
    pub fn owners(&self, table: &str) -> &[EntityRef] {
        self.owners.get(table).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn join_key<S: Store + ?Sized>(ctx: &CommitContext<'_, S>, table: &str, row: &ParamRow) -> String {
    let cells: Vec<_> = row
        .iter()
        .map(|(c, v)| format!("{}={}", c, render_column_value(ctx.config.dialect, v)))
        .collect();
    format!("{}({})", table, cells.join(","))
}

/// Rows grouped by column layout, in first-seen order.
fn group_by_layout(rows: &[ParamRow]) -> Vec<Vec<&ParamRow>> {
    let mut groups: Vec<(Vec<&'static str>, Vec<&ParamRow>)> = Vec::new();
    for row in rows {
        let layout = row.layout();
        match groups.iter_mut().find(|(l, _)| *l == layout) {
            Some((_, group)) => group.push(row),
            None => groups.push((layout, vec![row])),
        }
    }
    groups.into_iter().map(|(_, g)| g).collect()
}

/// A failed table, with the statement that failed if one was sent.
struct TableFailure {
    error: Error,
    sql: Option<String>,
}

impl From<Error> for TableFailure {
    fn from(error: Error) -> Self {
        Self { error, sql: None }
    }
}

fn run_statements<S: Store + ?Sized>(
    ctx: &CommitContext<'_, S>,
    statement: &InsertStatement,
    shape: StatementShape,
    rows: &[ParamRow],
) -> std::result::Result<(u64, usize), TableFailure> {
    let mut affected = 0;
    let mut statements = 0;
    for group in group_by_layout(rows) {
        for chunk in group.chunks(ctx.config.max_rows_per_statement.max(1)) {
            let (sql, params) = match shape {
                StatementShape::Parameterized => statement.to_sql_params(chunk)?,
                StatementShape::Embedded => (statement.to_sql_embedded(chunk)?, Vec::new()),
            };
            tracing::trace!(sql = %sql, params = params.len(), "executing statement");
            match ctx.store.execute(&sql, &params) {
                Ok(n) => affected += n,
                Err(error) => {
                    return Err(TableFailure {
                        error,
                        sql: Some(sql),
                    });
                }
            }
            statements += 1;
        }
    }
    Ok((affected, statements))
}

/// Write one table's rows in a table-scoped transaction.
#[tracing::instrument(level = "debug", skip(ctx, rows), fields(rows = rows.len()))]
fn flush_table<S: Store + ?Sized>(
    ctx: &CommitContext<'_, S>,
    table: &'static str,
    rows: &[ParamRow],
) -> std::result::Result<TableReport, TableFailure> {
    let info = ctx.schema.table_of(table).ok_or_else(|| {
        Error::config(
            ConfigErrorKind::UnknownTable,
            format!("rows for unknown table '{}'", table),
        )
    })?;
    let kind = ctx.config.kind_for(table);
    let statement = build(kind, info, ctx.config.dialect)?;
    let shape = if rows.iter().any(ParamRow::is_deferred) {
        StatementShape::Embedded
    } else {
        StatementShape::Parameterized
    };
    tracing::debug!(table = table, count = rows.len(), shape = %shape, kind = %kind, "Executing insert batch");

    ctx.store.begin()?;
    let outcome = run_statements(ctx, &statement, shape, rows)
        .and_then(|counts| ctx.store.commit().map(|()| counts).map_err(TableFailure::from));
    match outcome {
        Ok((affected, statements)) => {
            Ok(TableReport {
                table,
                rows: rows.len(),
                affected,
                statements,
                shape,
                kind,
            })
        }
        Err(failure) => {
            if let Err(e) = ctx.store.rollback() {
                tracing::warn!(table = table, error = %e, "rollback after failed insert failed");
            }
            Err(failure)
        }
    }
}

/// Write every table of `plan` in order.
///
/// On failure the error names the failing table, the tables committed
/// before it and the tables never attempted.
#[tracing::instrument(level = "info", skip(ctx, plan), fields(tables = plan.len()))]
pub fn execute_plan<S: Store + ?Sized>(
    ctx: &CommitContext<'_, S>,
    plan: &FlushPlan,
) -> Result<Vec<TableReport>> {
    let mut reports = Vec::with_capacity(plan.len());
    for (i, (table, rows)) in plan.tables.iter().enumerate() {
        match flush_table(ctx, table, rows) {
            Ok(report) => reports.push(report),
            Err(failure) => {
                let committed: Vec<String> =
                    reports.iter().map(|r| r.table.to_string()).collect();
                let not_attempted: Vec<String> = plan.tables[i + 1..]
                    .iter()
                    .map(|(t, _)| (*t).to_string())
                    .collect();
                tracing::warn!(
                    table = *table,
                    committed = committed.len(),
                    not_attempted = not_attempted.len(),
                    error = %failure.error,
                    "flush failed"
                );
                return Err(Error::Execution(ExecutionError {
                    table: (*table).to_string(),
                    committed,
                    not_attempted,
                    sql: failure.sql,
                    source: Box::new(failure.error),
                }));
            }
        }
    }
    Ok(reports)
}
