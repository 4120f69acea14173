//! Column metadata.

use crate::types::SqlType;

/// Metadata about one column of a table.
///
/// Built with `const` builder methods so table descriptors can live in
/// statics:
///
/// ```
/// use sqlbatch_core::{ColumnInfo, SqlType};
///
/// const AUTHOR_ID: ColumnInfo = ColumnInfo::new("id", SqlType::Integer)
///     .primary_key()
///     .auto_increment();
/// assert!(AUTHOR_ID.is_surrogate_key());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Database column name
    pub name: &'static str,
    /// SQL type for this column
    pub sql_type: SqlType,
    /// Whether this column is nullable
    pub nullable: bool,
    /// Whether this is a primary key
    pub primary_key: bool,
    /// Whether this column auto-increments
    pub auto_increment: bool,
    /// Whether this column has a unique constraint
    pub unique: bool,
    /// Foreign key reference (`table.column`)
    pub foreign_key: Option<&'static str>,
}

impl ColumnInfo {
    /// Create a new, non-nullable column.
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            nullable: false,
            primary_key: false,
            auto_increment: false,
            unique: false,
            foreign_key: None,
        }
    }

    /// Mark as primary key.
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark as auto-incrementing.
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Add a unique constraint.
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Allow NULL.
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Reference `table.column`.
    pub const fn foreign_key(mut self, reference: &'static str) -> Self {
        self.foreign_key = Some(reference);
        self
    }

    /// Split the foreign key reference into `(table, column)`.
    pub fn foreign_target(&self) -> Option<(&'static str, &'static str)> {
        self.foreign_key.and_then(|r| r.split_once('.'))
    }

    /// Is this a key the store generates (autoincrement, or an integer
    /// primary key that is not also a foreign key)?
    pub const fn is_surrogate_key(&self) -> bool {
        self.primary_key
            && (self.auto_increment || (self.sql_type.is_integer() && self.foreign_key.is_none()))
    }

    /// Does this column identify a row by its content?
    ///
    /// Surrogate keys and foreign keys are excluded: the former are unknown
    /// before insertion and the latter describe links, not the row itself.
    pub const fn is_natural_key(&self) -> bool {
        !self.is_surrogate_key() && self.foreign_key.is_none()
    }
}
