//! Entities: partially-populated rows plus their relationship values.
//!
//! Entities are shared through [`EntityRef`] handles so that one related
//! object referenced from several owners is the same object everywhere.

use crate::error::{ConfigErrorKind, Error, ResolutionErrorKind, Result};
use crate::relationship::{Direction, RelationshipInfo};
use crate::row::Row;
use crate::schema::{Schema, TableInfo};
use crate::value::Value;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Lifecycle of an entity with respect to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityState {
    /// Not queued for writing.
    #[default]
    Transient,
    /// Queued in a bulk session, not yet written.
    Staged,
    /// Known to exist in the store.
    Persisted,
}

/// An insertion-ordered set of entity handles; identity duplicates are
/// rejected.
#[derive(Debug, Clone, Default)]
pub struct RelatedSet {
    items: Vec<EntityRef>,
}

impl RelatedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `entity`; returns `false` if this exact handle is already present.
    pub fn insert(&mut self, entity: EntityRef) -> bool {
        if self.contains(&entity) {
            return false;
        }
        self.items.push(entity);
        true
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.items.iter().any(|e| e.ptr_eq(entity))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRef> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<EntityRef> for RelatedSet {
    fn from_iter<I: IntoIterator<Item = EntityRef>>(iter: I) -> Self {
        let mut set = RelatedSet::new();
        for entity in iter {
            set.insert(entity);
        }
        set
    }
}

/// The value held by one relationship of an entity.
#[derive(Debug, Clone)]
pub enum RelationshipValue {
    ToOne(Option<EntityRef>),
    ToMany(RelatedSet),
}

impl RelationshipValue {
    pub const fn direction(&self) -> Direction {
        match self {
            RelationshipValue::ToOne(_) => Direction::ToOne,
            RelationshipValue::ToMany(_) => Direction::ToMany,
        }
    }

    /// Every related handle, in order.
    pub fn entities(&self) -> Vec<EntityRef> {
        match self {
            RelationshipValue::ToOne(one) => one.iter().cloned().collect(),
            RelationshipValue::ToMany(set) => set.iter().cloned().collect(),
        }
    }
}

/// A row of one table, possibly without a primary key yet.
///
/// Cloning copies the column values and the relationship handles, not the
/// related entities.
#[derive(Clone)]
pub struct Entity {
    table: Arc<TableInfo>,
    /// Indexed like `table.columns`; `Null` means "not set".
    values: Vec<Value>,
    /// Indexed like `table.relationships`.
    relationships: Vec<Option<RelationshipValue>>,
    state: EntityState,
}

impl Entity {
    pub fn new(table: Arc<TableInfo>) -> Self {
        let values = vec![Value::Null; table.columns.len()];
        let relationships = vec![None; table.relationships.len()];
        Self {
            table,
            values,
            relationships,
            state: EntityState::Transient,
        }
    }

    pub fn table(&self) -> &Arc<TableInfo> {
        &self.table
    }

    pub fn table_name(&self) -> &'static str {
        self.table.name
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn set_state(&mut self, state: EntityState) {
        self.state = state;
    }

    /// The value of `column`, or `None` when unset or unknown.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.table
            .column_index(column)
            .map(|i| &self.values[i])
            .filter(|v| !v.is_null())
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.table.column_index(column).ok_or_else(|| {
            Error::resolution(
                ResolutionErrorKind::UnknownColumn,
                self.table.name,
                Some(column),
                "no such column",
            )
        })?;
        self.values[index] = value.into();
        Ok(())
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(column, value)?;
        Ok(self)
    }

    /// Set columns, `(column, value)` in declaration order, that hold a value.
    pub fn loaded_columns(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.table
            .columns
            .iter()
            .zip(&self.values)
            .filter(|(_, v)| !v.is_null())
            .map(|(c, v)| (c.name, v))
    }

    /// Copy every column value of `other` that is unset here. Entities of
    /// different tables are left alone.
    pub fn fill_unset(&mut self, other: &Entity) {
        if self.table.name != other.table.name {
            return;
        }
        for (slot, value) in self.values.iter_mut().zip(&other.values) {
            if slot.is_null() {
                slot.clone_from(value);
            }
        }
    }

    /// Natural-key columns holding a value.
    pub fn natural_key(&self) -> Vec<(&'static str, Value)> {
        self.table
            .columns
            .iter()
            .zip(&self.values)
            .filter(|(c, v)| c.is_natural_key() && !v.is_null())
            .map(|(c, v)| (c.name, v.clone()))
            .collect()
    }

    /// Natural-key columns usable as a subquery filter: temporal columns
    /// are left out.
    pub fn lookup_key(&self) -> Vec<(&'static str, Value)> {
        self.table
            .columns
            .iter()
            .zip(&self.values)
            .filter(|(c, v)| c.is_natural_key() && !c.sql_type.is_temporal() && !v.is_null())
            .map(|(c, v)| (c.name, v.clone()))
            .collect()
    }

    fn relationship_slot(&self, name: &str) -> Result<usize> {
        self.table.relationship_index(name).ok_or_else(|| {
            Error::resolution(
                ResolutionErrorKind::UnknownRelationship,
                self.table.name,
                Some(name),
                "no such relationship",
            )
        })
    }

    /// Replace the value of relationship `name`.
    ///
    /// The shape is not checked here; resolution rejects a value whose
    /// variant disagrees with the declared direction.
    pub fn set_relationship(&mut self, name: &str, value: RelationshipValue) -> Result<()> {
        let index = self.relationship_slot(name)?;
        self.relationships[index] = Some(value);
        Ok(())
    }

    /// Relate `entity` through `name`: replaces a to-one value, extends a
    /// to-many collection.
    pub fn relate(&mut self, name: &str, entity: EntityRef) -> Result<()> {
        let index = self.relationship_slot(name)?;
        let direction = self.table.relationships[index].direction;
        let slot = &mut self.relationships[index];
        match direction {
            Direction::ToOne => *slot = Some(RelationshipValue::ToOne(Some(entity))),
            Direction::ToMany => {
                if slot.is_none() {
                    *slot = Some(RelationshipValue::ToMany(RelatedSet::new()));
                }
                match slot {
                    Some(RelationshipValue::ToMany(set)) => {
                        set.insert(entity);
                    }
                    _ => {
                        return Err(Error::resolution(
                            ResolutionErrorKind::ShapeMismatch,
                            self.table.name,
                            Some(name),
                            "to-many relationship holds a single value",
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn with_related(mut self, name: &str, entity: &EntityRef) -> Result<Self> {
        self.relate(name, entity.clone())?;
        Ok(self)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipValue> {
        self.table
            .relationship_index(name)
            .and_then(|i| self.relationships[i].as_ref())
    }

    /// Relationships that hold a value, with their descriptors.
    pub fn relationships(&self) -> impl Iterator<Item = (&RelationshipInfo, &RelationshipValue)> {
        self.table
            .relationships
            .iter()
            .zip(&self.relationships)
            .filter_map(|(info, value)| value.as_ref().map(|v| (info, v)))
    }

    pub fn has_relationships(&self) -> bool {
        self.relationships.iter().any(Option::is_some)
    }

    /// Remove and return every relationship value.
    pub fn take_relationships(&mut self) -> Vec<(usize, RelationshipValue)> {
        self.relationships
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.take().map(|v| (i, v)))
            .collect()
    }

    /// Put back values returned by [`Entity::take_relationships`].
    pub fn restore_relationships(&mut self, values: Vec<(usize, RelationshipValue)>) {
        for (i, value) in values {
            if let Some(slot) = self.relationships.get_mut(i) {
                *slot = Some(value);
            }
        }
    }

    /// Overwrite column values with those of a stored row.
    pub fn refresh_from_row(&mut self, row: &Row) {
        for (name, value) in row.iter() {
            if let Some(i) = self.table.column_index(name) {
                self.values[i] = value.clone();
            }
        }
    }

    pub fn into_ref(self) -> EntityRef {
        EntityRef::new(self)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<_> = self.loaded_columns().collect();
        let relationships: Vec<_> = self.relationships().map(|(info, _)| info.name).collect();
        f.debug_struct("Entity")
            .field("table", &self.table.name)
            .field("state", &self.state)
            .field("values", &values)
            .field("relationships", &relationships)
            .finish()
    }
}

impl Schema {
    /// A new, empty entity of `table`.
    pub fn entity(&self, table: &str) -> Result<Entity> {
        self.table_of(table)
            .map(|t| Entity::new(Arc::clone(t)))
            .ok_or_else(|| {
                Error::config(
                    ConfigErrorKind::UnknownTable,
                    format!("unknown table '{}'", table),
                )
            })
    }
}

/// Shared handle to an [`Entity`].
///
/// Equality of handles is identity (`ptr_eq`), never value equality.
#[derive(Clone)]
pub struct EntityRef(Arc<RwLock<Entity>>);

impl EntityRef {
    pub fn new(entity: Entity) -> Self {
        Self(Arc::new(RwLock::new(entity)))
    }

    /// Read access; a poisoned lock is recovered since entity data has no
    /// cross-field invariants.
    pub fn read(&self) -> RwLockReadGuard<'_, Entity> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Entity> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Stable identity of the handle, usable as a map key.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn table_name(&self) -> &'static str {
        self.read().table_name()
    }

    pub fn state(&self) -> EntityState {
        self.read().state()
    }

    /// Cloned value of `column`, `None` when unset.
    pub fn get(&self, column: &str) -> Option<Value> {
        self.read().get(column).cloned()
    }
}

impl From<Entity> for EntityRef {
    fn from(entity: Entity) -> Self {
        EntityRef::new(entity)
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.0.try_read().map_or("<locked>", |e| e.table_name());
        write!(f, "EntityRef({}@{:#x})", table, self.identity())
    }
}
