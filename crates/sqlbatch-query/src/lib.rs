//! Statement builders for sqlbatch.
//!
//! - [`Dialect`]: placeholders, identifier quoting, detection from URLs
//! - [`insert`]: multi-row INSERT / INSERT-IGNORE / UPSERT statements,
//!   parameterized or with values embedded
//! - [`literal`]: literal and subquery rendering for embedded statements
//! - [`select`]: natural-key lookups

pub mod dialect;
pub mod insert;
pub mod literal;
pub mod select;

pub use dialect::Dialect;
pub use insert::{InsertKind, InsertStatement, build};
pub use literal::{quote_string, render_column_value, render_subquery, render_value};
pub use select::{LOOKUP_LIMIT, natural_key_lookup};
