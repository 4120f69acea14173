//! Values bound for insertion: concrete, NULL, or a deferred key lookup.

use crate::value::Value;
use std::fmt;

/// A subquery standing in for "the key of a related row that has no key
/// yet": `SELECT select_column FROM table WHERE c1 = v1 AND c2 = v2 ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryExpr {
    pub table: &'static str,
    pub select_column: &'static str,
    pub filters: Vec<(&'static str, Value)>,
}

impl SubqueryExpr {
    pub fn new(table: &'static str, select_column: &'static str) -> Self {
        Self {
            table,
            select_column,
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push((column, value.into()));
        self
    }
}

impl fmt::Display for SubqueryExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} where ", self.table, self.select_column)?;
        for (i, (col, value)) in self.filters.iter().enumerate() {
            if i > 0 {
                write!(f, " and ")?;
            }
            write!(f, "{} = {}", col, value)?;
        }
        Ok(())
    }
}

/// The value a column receives in one insert row.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Concrete(Value),
    /// Resolved by the database when the statement runs.
    Deferred(SubqueryExpr),
}

impl ColumnValue {
    pub const fn is_deferred(&self) -> bool {
        matches!(self, ColumnValue::Deferred(_))
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    /// The concrete value, if any.
    pub fn as_concrete(&self) -> Option<&Value> {
        match self {
            ColumnValue::Concrete(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Value> for ColumnValue {
    fn from(v: Value) -> Self {
        if v.is_null() {
            ColumnValue::Null
        } else {
            ColumnValue::Concrete(v)
        }
    }
}

impl From<SubqueryExpr> for ColumnValue {
    fn from(s: SubqueryExpr) -> Self {
        ColumnValue::Deferred(s)
    }
}

/// One row destined for a table: column name → value, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamRow {
    cells: Vec<(&'static str, ColumnValue)>,
}

impl ParamRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing an earlier value in place.
    pub fn set(&mut self, column: &'static str, value: impl Into<ColumnValue>) {
        let value = value.into();
        if let Some(slot) = self.cells.iter_mut().find(|(c, _)| *c == column) {
            slot.1 = value;
        } else {
            self.cells.push((column, value));
        }
    }

    pub fn with(mut self, column: &'static str, value: impl Into<ColumnValue>) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.cells.iter().find(|(c, _)| *c == column).map(|(_, v)| v)
    }

    /// Does any cell need a subquery?
    pub fn is_deferred(&self) -> bool {
        self.cells.iter().any(|(_, v)| v.is_deferred())
    }

    /// Column names in order; rows with equal layouts share a VALUES list.
    pub fn layout(&self) -> Vec<&'static str> {
        self.cells.iter().map(|(c, _)| *c).collect()
    }

    pub fn values(&self) -> impl Iterator<Item = &ColumnValue> {
        self.cells.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ColumnValue)> {
        self.cells.iter().map(|(c, v)| (*c, v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
