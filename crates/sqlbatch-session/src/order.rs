//! Table dependency ordering.
//!
//! Parents are written before children: a table comes after every table it
//! references by foreign key, and a join table after both tables it links.

use sqlbatch_core::{ConfigErrorKind, Direction, Error, Result, Schema};
use std::collections::HashSet;

/// Total order over the tables of a schema, computed once.
#[derive(Debug, Clone)]
pub struct TableOrder {
    tables: Vec<&'static str>,
}

impl TableOrder {
    /// Order `schema` with a layered topological sort.
    ///
    /// Tables that become ready in the same layer keep declaration order.
    /// Self-references and references to tables outside the schema add no
    /// constraint. A cycle is reported with the tables it leaves unordered.
    pub fn new(schema: &Schema) -> Result<Self> {
        let names: Vec<&'static str> = schema.tables().map(|t| t.name).collect();
        let dependencies: Vec<Vec<&'static str>> = schema
            .tables()
            .map(|table| {
                let mut deps: Vec<&'static str> = table.referenced_tables().collect();
                for rel in table.relationships {
                    match rel.direction {
                        Direction::ToOne => deps.push(rel.target),
                        Direction::ToMany => {}
                    }
                }
                // A join table follows both sides of every to-many relationship through it.
                for owner in schema.tables() {
                    for rel in owner.relationships {
                        if rel.secondary == Some(table.name) {
                            deps.push(owner.name);
                            deps.push(rel.target);
                        }
                    }
                }
                deps.retain(|d| *d != table.name && schema.contains(d));
                deps.sort_unstable();
                deps.dedup();
                deps
            })
            .collect();

        let mut placed: HashSet<&'static str> = HashSet::with_capacity(names.len());
        let mut order = Vec::with_capacity(names.len());
        while order.len() < names.len() {
            let layer: Vec<&'static str> = names
                .iter()
                .zip(&dependencies)
                .filter(|(name, deps)| {
                    !placed.contains(*name) && deps.iter().all(|d| placed.contains(d))
                })
                .map(|(name, _)| *name)
                .collect();
            if layer.is_empty() {
                let remaining: Vec<&str> = names
                    .iter()
                    .copied()
                    .filter(|n| !placed.contains(n))
                    .collect();
                return Err(Error::config(
                    ConfigErrorKind::CyclicDependency,
                    format!(
                        "foreign keys form a cycle between tables: {}",
                        remaining.join(", ")
                    ),
                ));
            }
            tracing::trace!(layer = ?layer, "dependency layer");
            placed.extend(layer.iter().copied());
            order.extend(layer);
        }

        tracing::debug!(order = ?order, "table order computed");
        Ok(Self { tables: order })
    }

    /// Tables, parents first.
    pub fn tables(&self) -> &[&'static str] {
        &self.tables
    }

    pub fn position(&self, table: &str) -> Option<usize> {
        self.tables.iter().position(|t| *t == table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
