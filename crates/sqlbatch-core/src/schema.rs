//! Table descriptors and the schema registry.
//!
//! A [`Schema`] owns every table the engine may write to, in declaration
//! order. Descriptors are validated once at construction and then shared by
//! `Arc` with every entity of that table.

use crate::column::ColumnInfo;
use crate::error::{ConfigErrorKind, Error, Result};
use crate::identifiers::is_valid_identifier;
use crate::relationship::{Direction, RelationshipInfo};
use std::collections::HashMap;
use std::sync::Arc;

/// Static description of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: &'static str,
    pub columns: &'static [ColumnInfo],
    pub relationships: &'static [RelationshipInfo],
}

impl TableInfo {
    pub const fn new(name: &'static str, columns: &'static [ColumnInfo]) -> Self {
        Self {
            name,
            columns,
            relationships: &[],
        }
    }

    pub const fn with_relationships(mut self, relationships: &'static [RelationshipInfo]) -> Self {
        self.relationships = relationships;
        self
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of a column in declaration order.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipInfo> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn relationship_index(&self, name: &str) -> Option<usize> {
        self.relationships.iter().position(|r| r.name == name)
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    pub fn unique_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| c.unique)
    }

    /// Columns that identify a row by content.
    pub fn natural_key_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| c.is_natural_key())
    }

    /// Tables this table references through foreign keys.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns
            .iter()
            .filter_map(|c| c.foreign_target().map(|(table, _)| table))
    }
}

/// Registry of every table known to the engine.
#[derive(Debug, Clone)]
pub struct Schema {
    tables: Vec<Arc<TableInfo>>,
    by_name: HashMap<&'static str, usize>,
}

impl Schema {
    /// Build and validate a schema from tables in declaration order.
    pub fn new(tables: impl IntoIterator<Item = TableInfo>) -> Result<Self> {
        let mut schema = Self {
            tables: Vec::new(),
            by_name: HashMap::new(),
        };
        for table in tables {
            if schema.by_name.contains_key(table.name) {
                return Err(invalid(format!("table '{}' declared twice", table.name)));
            }
            schema.by_name.insert(table.name, schema.tables.len());
            schema.tables.push(Arc::new(table));
        }
        for table in &schema.tables {
            schema.validate_table(table)?;
        }
        tracing::debug!(tables = schema.tables.len(), "schema registered");
        Ok(schema)
    }

    fn validate_table(&self, table: &TableInfo) -> Result<()> {
        if !is_valid_identifier(table.name) {
            return Err(invalid(format!("invalid table name '{}'", table.name)));
        }
        for (i, col) in table.columns.iter().enumerate() {
            if !is_valid_identifier(col.name) {
                return Err(invalid(format!(
                    "invalid column name '{}.{}'",
                    table.name, col.name
                )));
            }
            if table.columns[..i].iter().any(|c| c.name == col.name) {
                return Err(invalid(format!(
                    "column '{}.{}' declared twice",
                    table.name, col.name
                )));
            }
            if col.foreign_key.is_some() && col.foreign_target().is_none() {
                return Err(invalid(format!(
                    "foreign key on '{}.{}' must be written as table.column",
                    table.name, col.name
                )));
            }
        }
        for (i, rel) in table.relationships.iter().enumerate() {
            if table.relationships[..i].iter().any(|r| r.name == rel.name) {
                return Err(invalid(format!(
                    "relationship '{}.{}' declared twice",
                    table.name, rel.name
                )));
            }
            self.validate_relationship(table, rel)?;
        }
        Ok(())
    }

    fn validate_relationship(&self, table: &TableInfo, rel: &RelationshipInfo) -> Result<()> {
        let context = format!("relationship '{}.{}'", table.name, rel.name);
        let target = self
            .table_of(rel.target)
            .ok_or_else(|| invalid(format!("{context} targets unknown table '{}'", rel.target)))?;

        match rel.direction {
            Direction::ToOne => {
                if rel.local_remote_pairs.is_empty() {
                    return Err(invalid(format!("{context} has no column pairs")));
                }
                for (local, remote) in rel.local_remote_pairs {
                    require_column(table, local, &context)?;
                    require_column(target, remote, &context)?;
                }
            }
            Direction::ToMany => {
                let secondary_name = rel
                    .secondary
                    .ok_or_else(|| invalid(format!("{context} has no secondary table")))?;
                let secondary = self.table_of(secondary_name).ok_or_else(|| {
                    invalid(format!(
                        "{context} uses unknown secondary table '{}'",
                        secondary_name
                    ))
                })?;
                if rel.synchronize_pairs.is_empty() || rel.secondary_synchronize_pairs.is_empty() {
                    return Err(invalid(format!("{context} has no synchronize pairs")));
                }
                for (owner_col, join_col) in rel.synchronize_pairs {
                    require_column(table, owner_col, &context)?;
                    require_column(secondary, join_col, &context)?;
                }
                for (related_col, join_col) in rel.secondary_synchronize_pairs {
                    require_column(target, related_col, &context)?;
                    require_column(secondary, join_col, &context)?;
                }
            }
        }
        Ok(())
    }

    /// Look up a table by name.
    pub fn table_of(&self, name: &str) -> Option<&Arc<TableInfo>> {
        self.by_name.get(name).map(|&i| &self.tables[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Columns of `table`, empty for unknown tables.
    pub fn columns(&self, table: &str) -> &[ColumnInfo] {
        self.table_of(table).map_or(&[], |t| t.columns)
    }

    /// Relationships of `table`, empty for unknown tables.
    pub fn relationships(&self, table: &str) -> &[RelationshipInfo] {
        self.table_of(table).map_or(&[], |t| t.relationships)
    }

    /// Tables in declaration order.
    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableInfo>> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn require_column(table: &TableInfo, column: &str, context: &str) -> Result<()> {
    if table.column(column).is_none() {
        return Err(invalid(format!(
            "{context} references unknown column '{}.{}'",
            table.name, column
        )));
    }
    Ok(())
}

fn invalid(message: String) -> Error {
    Error::config(ConfigErrorKind::InvalidSchema, message)
}
