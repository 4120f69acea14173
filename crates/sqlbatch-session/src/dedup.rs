//! Natural-key deduplication.
//!
//! An entity is matched first against entities already staged in this batch
//! and then against the store. A match replaces the entity; the caller keeps
//! working with the returned handle.

use crate::config::AmbiguityPolicy;
use crate::context::CommitContext;
use sqlbatch_core::{
    AmbiguousMatchError, Entity, EntityRef, EntityState, Error, Result, Row, Store, TableInfo,
    Value,
};
use sqlbatch_query::natural_key_lookup;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

type NaturalKey = [(&'static str, Value)];

fn key_hash(key: &NaturalKey) -> u64 {
    let mut hasher = DefaultHasher::new();
    for (column, value) in key {
        column.hash(&mut hasher);
        value.hash_key(&mut hasher);
    }
    hasher.finish()
}

fn keys_match(a: &NaturalKey, b: &NaturalKey) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|((ca, va), (cb, vb))| ca == cb && va.key_eq(vb))
}

fn render_filter(key: &NaturalKey) -> String {
    key.iter()
        .map(|(c, v)| format!("{c} = {v}"))
        .collect::<Vec<_>>()
        .join(" and ")
}

/// In-memory index of staged entities by table and natural key.
#[derive(Debug, Default)]
pub struct StagingIndex {
    buckets: HashMap<(&'static str, u64), Vec<EntityRef>>,
}

impl StagingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The indexed entity of `table` whose natural key equals `key`.
    pub fn find(&self, table: &'static str, key: &NaturalKey) -> Option<EntityRef> {
        if key.is_empty() {
            return None;
        }
        self.buckets
            .get(&(table, key_hash(key)))?
            .iter()
            .find(|e| keys_match(&e.read().natural_key(), key))
            .cloned()
    }

    /// Index `entity` under its current natural key; entities without one
    /// are not indexed. Returns `true` when a new entry was added.
    pub fn insert(&mut self, entity: &EntityRef) -> bool {
        let (table, key) = {
            let e = entity.read();
            (e.table_name(), e.natural_key())
        };
        if key.is_empty() {
            return false;
        }
        let bucket = self.buckets.entry((table, key_hash(&key))).or_default();
        if bucket.iter().any(|e| e.ptr_eq(entity)) {
            return false;
        }
        bucket.push(entity.clone());
        true
    }

    /// Is this exact handle indexed under any key?
    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.buckets
            .values()
            .any(|bucket| bucket.iter().any(|e| e.ptr_eq(entity)))
    }

    /// Drop every entry for this exact handle.
    ///
    /// Scans all buckets, since the entity's key may have changed since it
    /// was indexed.
    pub fn remove(&mut self, entity: &EntityRef) {
        self.buckets.retain(|_, bucket| {
            bucket.retain(|e| !e.ptr_eq(entity));
            !bucket.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

fn persisted_from_row(table: &Arc<TableInfo>, row: &Row) -> EntityRef {
    let mut entity = Entity::new(Arc::clone(table));
    entity.refresh_from_row(row);
    entity.set_state(EntityState::Persisted);
    entity.into_ref()
}

/// Return the stored counterpart of `entity`, or `entity` itself when the
/// store holds no row with the same natural key.
///
/// A matched row comes back as a new persisted entity carrying every stored
/// column, primary key included.
pub fn find_or_new<S: Store + ?Sized>(
    ctx: &CommitContext<'_, S>,
    entity: &EntityRef,
) -> Result<EntityRef> {
    let (table, key, state) = {
        let e = entity.read();
        (Arc::clone(e.table()), e.natural_key(), e.state())
    };
    if state == EntityState::Persisted {
        return Ok(entity.clone());
    }
    if key.is_empty() {
        tracing::trace!(table = table.name, "no natural key, treated as new");
        return Ok(entity.clone());
    }

    let (sql, params) = natural_key_lookup(ctx.config.dialect, &table, &key);
    tracing::trace!(sql = %sql, params = params.len(), "natural key lookup");
    let rows = ctx.store.query(&sql, &params)?;

    match rows.as_slice() {
        [] => Ok(entity.clone()),
        [row] => {
            tracing::debug!(table = table.name, filter = %render_filter(&key), "matched stored row");
            Ok(persisted_from_row(&table, row))
        }
        [first, ..] => match ctx.config.ambiguity {
            AmbiguityPolicy::FirstMatch => {
                tracing::warn!(
                    table = table.name,
                    filter = %render_filter(&key),
                    "natural key matches several stored rows, using the first"
                );
                Ok(persisted_from_row(&table, first))
            }
            AmbiguityPolicy::Error => Err(Error::AmbiguousMatch(AmbiguousMatchError {
                table: table.name.to_string(),
                filter: render_filter(&key),
            })),
        },
    }
}
