//! Per-commit context handed to resolvers, the dedup filter and the executor.

use crate::config::BulkConfig;
use sqlbatch_core::{Schema, Store};

/// Borrowed view of everything a commit needs; there is no global session.
pub struct CommitContext<'a, S: Store + ?Sized> {
    pub schema: &'a Schema,
    pub store: &'a S,
    pub config: &'a BulkConfig,
}

impl<'a, S: Store + ?Sized> CommitContext<'a, S> {
    pub fn new(schema: &'a Schema, store: &'a S, config: &'a BulkConfig) -> Self {
        Self {
            schema,
            store,
            config,
        }
    }
}

impl<S: Store + ?Sized> Clone for CommitContext<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: Store + ?Sized> Copy for CommitContext<'_, S> {}
