//! Error types for sqlbatch operations.
//!
//! The taxonomy follows the phases of a bulk commit:
//!
//! - [`ConfigError`]: schema or configuration problems, fatal at setup time.
//! - [`ResolutionError`]: relationship values that cannot be resolved; raised
//!   before any statement touches the store.
//! - [`ExecutionError`]: a statement failed while flushing; carries which
//!   tables were already committed and which were never attempted.
//! - [`QueryError`], [`ConnectionError`], [`TypeError`]: store-level failures.

use std::fmt;

/// The primary error type for all sqlbatch operations.
#[derive(Debug)]
pub enum Error {
    /// Schema or engine configuration is invalid
    Config(ConfigError),
    /// A relationship could not be resolved into column values
    Resolution(ResolutionError),
    /// A per-table statement failed during flushing
    Execution(ExecutionError),
    /// The deduplication filter matched more than one stored row
    AmbiguousMatch(AmbiguousMatchError),
    /// Query execution errors reported by a store
    Query(QueryError),
    /// Connection-related errors (open, close)
    Connection(ConnectionError),
    /// Type conversion errors
    Type(TypeError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// Foreign keys form a cycle
    CyclicDependency,
    /// Dialect name not recognised
    UnknownDialect,
    /// A statement override names a table the schema does not know
    UnknownTable,
    /// Schema metadata is inconsistent (unknown column, bad identifier, ...)
    InvalidSchema,
    /// A statement kind cannot be expressed for this table/dialect
    UnsupportedStatement,
    /// A configuration value is out of range
    InvalidValue,
}

#[derive(Debug)]
pub struct ResolutionError {
    pub kind: ResolutionErrorKind,
    /// Table of the owning entity.
    pub table: String,
    /// Relationship or column involved, when known.
    pub field: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionErrorKind {
    /// A to-one relationship holds a collection or vice versa
    ShapeMismatch,
    /// The related entity belongs to a different table than declared
    WrongEntityType,
    /// Relationship name not declared on the entity's table
    UnknownRelationship,
    /// Column name not declared on the entity's table
    UnknownColumn,
    /// A deferred reference would have no filter columns
    EmptyFilter,
}

#[derive(Debug)]
pub struct ExecutionError {
    /// Table whose statement failed.
    pub table: String,
    /// Tables whose rows were committed before the failure.
    pub committed: Vec<String>,
    /// Tables with pending rows that were never attempted.
    pub not_attempted: Vec<String>,
    /// The statement text that failed, when available.
    pub sql: Option<String>,
    pub source: Box<Error>,
}

#[derive(Debug)]
pub struct AmbiguousMatchError {
    pub table: String,
    /// The natural-key filter that matched several rows, rendered for display.
    pub filter: String,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, check, not null)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Data too large for column
    DataTruncation,
    /// Database busy or locked
    Busy,
    /// Transaction state misuse (commit without begin, nested begin)
    Transaction,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Build a configuration error.
    pub fn config(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            kind,
            message: message.into(),
        })
    }

    /// Build a resolution error for an entity of `table`.
    pub fn resolution(
        kind: ResolutionErrorKind,
        table: impl Into<String>,
        field: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Error::Resolution(ResolutionError {
            kind,
            table: table.into(),
            field: field.map(str::to_string),
            message: message.into(),
        })
    }

    /// Is this a constraint violation reported by the store (possibly wrapped
    /// in an execution error)?
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Error::Query(q) => q.kind == QueryErrorKind::Constraint,
            Error::Execution(e) => e.source.is_constraint_violation(),
            _ => false,
        }
    }

    /// Tables committed before the failure, for execution errors.
    pub fn committed_tables(&self) -> &[String] {
        match self {
            Error::Execution(e) => &e.committed,
            _ => &[],
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            Error::Execution(e) => e.sql.as_deref().or_else(|| e.source.sql()),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Resolution(e) => write!(f, "Resolution error: {}", e),
            Error::Execution(e) => write!(f, "Execution error: {}", e),
            Error::AmbiguousMatch(e) => write!(f, "Ambiguous match: {}", e),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Execution(e) => Some(e.source.as_ref()),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "{}.{}: {}", self.table, field, self.message)
        } else {
            write!(f, "{}: {}", self.table, self.message)
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "statement for table '{}' failed: {}", self.table, self.source)?;
        if self.committed.is_empty() {
            write!(f, "; no tables committed")?;
        } else {
            write!(f, "; committed: {}", self.committed.join(", "))?;
        }
        if !self.not_attempted.is_empty() {
            write!(f, "; not attempted: {}", self.not_attempted.join(", "))?;
        }
        Ok(())
    }
}

impl fmt::Display for AmbiguousMatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "more than one '{}' row matches {}",
            self.table, self.filter
        )
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<ResolutionError> for Error {
    fn from(err: ResolutionError) -> Self {
        Error::Resolution(err)
    }
}

impl From<ExecutionError> for Error {
    fn from(err: ExecutionError) -> Self {
        Error::Execution(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for sqlbatch operations.
pub type Result<T> = std::result::Result<T, Error>;
