//! Bulk session configuration.

use serde::{Deserialize, Serialize};
use sqlbatch_core::{ConfigErrorKind, Error, Result, Schema};
use sqlbatch_query::{Dialect, InsertKind, build};
use std::collections::HashMap;

/// What deduplication does when a natural key matches several stored rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Use the first row and log a warning.
    #[default]
    FirstMatch,
    /// Fail with [`Error::AmbiguousMatch`].
    Error,
}

/// Configuration for [`BulkSession`](crate::BulkSession).
///
/// ```
/// use sqlbatch_query::{Dialect, InsertKind};
/// use sqlbatch_session::BulkConfig;
///
/// let config = BulkConfig::from_json(
///     r#"{"dialect": "postgresql", "overrides": {"author": "upsert"}}"#,
/// )
/// .unwrap();
/// assert_eq!(config.dialect, Dialect::Postgres);
/// assert_eq!(config.kind_for("author"), InsertKind::Upsert);
/// assert_eq!(config.kind_for("tag"), InsertKind::InsertIgnoreDuplicates);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BulkConfig {
    /// Dialect statements are generated for.
    pub dialect: Dialect,
    /// Statement kind for tables without an override.
    pub default_kind: InsertKind,
    /// Per-table statement kind.
    pub overrides: HashMap<String, InsertKind>,
    /// Behaviour when deduplication finds several matches.
    pub ambiguity: AmbiguityPolicy,
    /// Query the store for an existing row while staging.
    pub dedupe_on_stage: bool,
    /// Upper bound on rows in one VALUES list.
    pub max_rows_per_statement: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Sqlite,
            default_kind: InsertKind::InsertIgnoreDuplicates,
            overrides: HashMap::new(),
            ambiguity: AmbiguityPolicy::FirstMatch,
            dedupe_on_stage: true,
            max_rows_per_statement: 500,
        }
    }
}

impl BulkConfig {
    /// Default configuration for `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    /// Parse a JSON configuration; absent fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_default_kind(mut self, kind: InsertKind) -> Self {
        self.default_kind = kind;
        self
    }

    pub fn with_override(mut self, table: impl Into<String>, kind: InsertKind) -> Self {
        self.overrides.insert(table.into(), kind);
        self
    }

    pub fn with_ambiguity(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguity = policy;
        self
    }

    pub fn with_dedupe_on_stage(mut self, enabled: bool) -> Self {
        self.dedupe_on_stage = enabled;
        self
    }

    pub fn with_max_rows_per_statement(mut self, rows: usize) -> Self {
        self.max_rows_per_statement = rows;
        self
    }

    /// Statement kind used for `table`.
    pub fn kind_for(&self, table: &str) -> InsertKind {
        self.overrides
            .get(table)
            .copied()
            .unwrap_or(self.default_kind)
    }

    /// Check the configuration against `schema`.
    ///
    /// Every table's statement is prepared once so that an unusable kind
    /// (a postgres upsert without conflict target) fails here, not mid-flush.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        if self.max_rows_per_statement == 0 {
            return Err(Error::config(
                ConfigErrorKind::InvalidValue,
                "max_rows_per_statement must be at least 1",
            ));
        }
        let mut unknown: Vec<&str> = self
            .overrides
            .keys()
            .map(String::as_str)
            .filter(|t| !schema.contains(t))
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(Error::config(
                ConfigErrorKind::UnknownTable,
                format!("statement override for unknown table(s): {}", unknown.join(", ")),
            ));
        }
        for table in schema.tables() {
            build(self.kind_for(table.name), table, self.dialect)?;
        }
        Ok(())
    }
}
