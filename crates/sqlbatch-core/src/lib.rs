//! Core types and traits for sqlbatch.
//!
//! This crate provides the shared vocabulary of the bulk-commit engine:
//!
//! - [`Value`] and [`ColumnValue`] for concrete and deferred column values
//! - [`ColumnInfo`], [`RelationshipInfo`], [`TableInfo`] and [`Schema`] for
//!   table metadata
//! - [`Entity`] / [`EntityRef`] for partially-populated rows
//! - [`Store`] for the relational store the engine writes through
//! - [`Error`] and [`Result`]

pub mod column;
pub mod column_value;
pub mod entity;
pub mod error;
pub mod identifiers;
pub mod relationship;
pub mod row;
pub mod schema;
pub mod store;
pub mod types;
pub mod value;

pub use column::ColumnInfo;
pub use column_value::{ColumnValue, ParamRow, SubqueryExpr};
pub use entity::{Entity, EntityRef, EntityState, RelatedSet, RelationshipValue};
pub use error::{
    AmbiguousMatchError, ConfigError, ConfigErrorKind, ConnectionError, Error, ExecutionError,
    QueryError, QueryErrorKind, ResolutionError, ResolutionErrorKind, Result, TypeError,
};
pub use identifiers::{is_valid_identifier, quote_ident, quote_ident_mysql};
pub use relationship::{Direction, RelationshipInfo};
pub use row::{Row, RowColumns};
pub use schema::{Schema, TableInfo};
pub use store::Store;
pub use types::SqlType;
pub use value::Value;
