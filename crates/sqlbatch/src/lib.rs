//! sqlbatch - bulk persistence of partially-populated entity graphs.
//!
//! sqlbatch collects entities that may be missing their primary and foreign
//! keys, works out how each foreign key can be filled, and writes the whole
//! batch as a few multi-row INSERT statements, parent tables first:
//!
//! - Foreign keys come from a value already on the entity, from the primary
//!   key of a related entity that has one, or from a subquery that looks the
//!   related row up by its natural key once its table has been written.
//! - Entities equal by natural key are written once, and entities already
//!   stored are reused instead of inserted again.
//! - Each table is committed in its own transaction; a failure reports which
//!   tables were committed and which were never attempted.
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlbatch::prelude::*;
//!
//! const AUTHOR: &[ColumnInfo] = &[
//!     ColumnInfo::new("id", SqlType::Integer).primary_key().auto_increment(),
//!     ColumnInfo::new("name", SqlType::Text).unique(),
//! ];
//! const QUOTE: &[ColumnInfo] = &[
//!     ColumnInfo::new("id", SqlType::Integer).primary_key().auto_increment(),
//!     ColumnInfo::new("author_id", SqlType::Integer).foreign_key("author.id"),
//!     ColumnInfo::new("quote", SqlType::Text).unique(),
//! ];
//! const QUOTE_RELS: &[RelationshipInfo] =
//!     &[RelationshipInfo::many_to_one("author", "author", &[("author_id", "id")])];
//!
//! let schema = Arc::new(Schema::new(vec![
//!     TableInfo::new("author", AUTHOR),
//!     TableInfo::new("quote", QUOTE).with_relationships(QUOTE_RELS),
//! ])?);
//! let mut session = sqlbatch::open_sqlite("sqlite:///quotes.db", Arc::clone(&schema))?;
//!
//! let kennedy = schema.entity("author")?.with("name", "Kennedy")?.into_ref();
//! session.stage(
//!     schema
//!         .entity("quote")?
//!         .with("quote", "Ask not what your country can do for you")?
//!         .with_related("author", &kennedy)?,
//! )?;
//! let report = session.commit()?;
//! ```

pub use sqlbatch_core::{
    ColumnInfo, ColumnValue, ConfigError, ConfigErrorKind, Direction, Entity, EntityRef,
    EntityState, Error, ExecutionError, ParamRow, QueryError, QueryErrorKind, RelatedSet,
    RelationshipInfo, RelationshipValue, ResolutionError, ResolutionErrorKind, Result, Row,
    Schema, SqlType, Store, SubqueryExpr, TableInfo, Value,
};
pub use sqlbatch_query::{Dialect, InsertKind, InsertStatement};
pub use sqlbatch_session::{
    AmbiguityPolicy, BulkConfig, BulkSession, CommitPhase, CommitReport, PendingCommit,
    StatementShape, TableOrder, TableReport,
};

#[cfg(feature = "sqlite")]
pub use sqlbatch_sqlite::{SqliteConfig, SqliteStore};

/// Open a bulk session over the SQLite database named by `url`
/// (`sqlite:///path.db`, `sqlite://` for memory), with default
/// configuration for the SQLite dialect.
#[cfg(feature = "sqlite")]
pub fn open_sqlite(
    url: &str,
    schema: impl Into<std::sync::Arc<Schema>>,
) -> Result<BulkSession<SqliteStore>> {
    let dialect = Dialect::from_url(url)?;
    let store = SqliteStore::open_url(url)?;
    tracing::debug!(url, path = store.path(), "opening sqlite bulk session");
    BulkSession::new(schema, store, BulkConfig::new(dialect))
}

/// Prelude module for convenient imports.
///
/// ```ignore
/// use sqlbatch::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AmbiguityPolicy, BulkConfig, BulkSession, ColumnInfo, CommitReport, Dialect, Entity,
        EntityRef, EntityState, Error, InsertKind, RelationshipInfo, Result, Row, Schema,
        SqlType, Store, TableInfo, Value,
    };
    pub use std::sync::Arc;

    #[cfg(feature = "sqlite")]
    pub use crate::SqliteStore;
}
