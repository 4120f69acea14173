//! Bulk-commit engine for sqlbatch.
//!
//! `sqlbatch-session` turns batches of partially-populated entity graphs into
//! a handful of multi-row INSERT statements, written parent tables first.
//!
//! # Role In The Architecture
//!
//! - **Dependency order**: tables are written parents first ([`TableOrder`]).
//! - **Relationship resolution**: foreign keys and join rows are filled from
//!   local values, copied keys, or deferred subqueries ([`resolve`]).
//! - **Deduplication**: entities are matched against the batch and the store
//!   by natural key while they are staged ([`dedup`]).
//! - **Flushing**: one transaction per table, parameterized or with values
//!   embedded ([`flush`]).
//!
//! # Example
//!
//! ```ignore
//! let mut session = BulkSession::new(schema, store, BulkConfig::default())?;
//!
//! let author = schema.entity("author")?.with("name", "Kennedy")?.into_ref();
//! let quote = schema
//!     .entity("quote")?
//!     .with("quote", "Ask not what your country can do for you")?
//!     .with_related("author", &author)?;
//! session.stage(quote)?;
//!
//! let report = session.commit()?;
//! assert_eq!(report.rows_for("author"), 1);
//! ```

pub mod config;
pub mod context;
pub mod dedup;
pub mod flush;
pub mod order;
pub mod resolve;

#[cfg(test)]
mod testing;

pub use config::{AmbiguityPolicy, BulkConfig};
pub use context::CommitContext;
pub use dedup::{StagingIndex, find_or_new};
pub use flush::{
    CommitPhase, CommitReport, FlushPlan, StatementShape, TableReport, execute_plan,
};
pub use order::TableOrder;
pub use resolve::{Resolved, resolve_column, resolve_entity, resolve_to_many, resolve_to_one};

use sqlbatch_core::{
    ConfigErrorKind, Entity, EntityRef, EntityState, Error, RelatedSet, RelationshipValue, Result,
    Schema, Store,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

// ============================================================================
// Bulk Session
// ============================================================================

/// Collects entities and writes them in one coordinated pass per commit.
pub struct BulkSession<S: Store> {
    schema: Arc<Schema>,
    store: S,
    config: BulkConfig,
    order: TableOrder,
    /// Entities to resolve at the next commit, in staging order.
    staged: Vec<EntityRef>,
    staged_ids: HashSet<usize>,
    index: StagingIndex,
    /// `(merged, surviving)`: handles collapsed onto another handle.
    aliases: Vec<(EntityRef, EntityRef)>,
    journal: StageJournal,
    phase: CommitPhase,
}

/// Undo log for one `stage` call.
#[derive(Default)]
struct StageJournal {
    staged_len: usize,
    aliases_len: usize,
    /// Entity contents before their first change, and whether the handle
    /// was indexed at that point.
    saved: Vec<(EntityRef, Entity, bool)>,
    saved_ids: HashSet<usize>,
    /// Index entries added.
    indexed: Vec<EntityRef>,
}

impl StageJournal {
    fn begin(&mut self, staged_len: usize, aliases_len: usize) {
        self.staged_len = staged_len;
        self.aliases_len = aliases_len;
        self.saved.clear();
        self.saved_ids.clear();
        self.indexed.clear();
    }

    fn save(&mut self, entity: &EntityRef, index: &StagingIndex) {
        if self.saved_ids.insert(entity.identity()) {
            let before = entity.read().clone();
            self.saved.push((entity.clone(), before, index.contains(entity)));
        }
    }
}

impl<S: Store> BulkSession<S> {
    /// Create a session over `store`.
    ///
    /// The configuration is validated against the schema and the table order
    /// is computed here; both fail with a configuration error.
    pub fn new(schema: impl Into<Arc<Schema>>, store: S, config: BulkConfig) -> Result<Self> {
        let schema = schema.into();
        config.validate(&schema)?;
        let order = TableOrder::new(&schema)?;
        tracing::info!(
            backend = store.backend_name(),
            dialect = %config.dialect,
            tables = order.len(),
            "Bulk session created"
        );
        Ok(Self {
            schema,
            store,
            config,
            order,
            staged: Vec::new(),
            staged_ids: HashSet::new(),
            index: StagingIndex::new(),
            aliases: Vec::new(),
            journal: StageJournal::default(),
            phase: CommitPhase::Collecting,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    pub fn order(&self) -> &TableOrder {
        &self.order
    }

    pub fn phase(&self) -> CommitPhase {
        self.phase
    }

    /// Number of entities waiting for the next commit.
    pub fn pending(&self) -> usize {
        self.staged.len()
    }

    /// Consume the session, returning the store.
    pub fn into_store(self) -> S {
        self.store
    }

    fn context(&self) -> CommitContext<'_, S> {
        CommitContext::new(&self.schema, &self.store, &self.config)
    }

    // ========================================================================
    // Staging
    // ========================================================================

    /// Stage `entity` and everything reachable through its relationships.
    ///
    /// Returns the handle that will be written: `entity` itself, an equal
    /// entity staged earlier in this batch, or the stored row matching its
    /// natural key. Relationship values are rewritten to point at such
    /// handles, so each logical row is written at most once. A handle merged
    /// into another one follows its state through the commit.
    ///
    /// On error the session and every entity of the graph are left as they
    /// were before the call.
    pub fn stage(&mut self, entity: impl Into<EntityRef>) -> Result<EntityRef> {
        let entity = entity.into();
        let before = self.staged.len();
        self.journal.begin(before, self.aliases.len());
        let mut visiting = HashSet::new();
        let canonical = match self.stage_graph(entity, &mut visiting) {
            Ok(canonical) => canonical,
            Err(e) => {
                self.rollback_stage();
                tracing::debug!(error = %e, "staging failed, graph left unstaged");
                return Err(e);
            }
        };
        self.journal = StageJournal::default();
        tracing::debug!(
            table = canonical.table_name(),
            added = self.staged.len() - before,
            pending = self.staged.len(),
            "staged entity graph"
        );
        Ok(canonical)
    }

    fn stage_graph(&mut self, entity: EntityRef, visiting: &mut HashSet<usize>) -> Result<EntityRef> {
        let id = entity.identity();
        if self.staged_ids.contains(&id) || !visiting.insert(id) {
            return Ok(entity);
        }
        let table = entity.table_name();
        if !self.schema.contains(table) {
            visiting.remove(&id);
            return Err(Error::config(
                ConfigErrorKind::UnknownTable,
                format!("cannot stage an entity of unknown table '{}'", table),
            ));
        }

        self.journal.save(&entity, &self.index);
        let taken = entity.write().take_relationships();
        let result = self
            .stage_related(&taken, visiting)
            .and_then(|related| self.place(&entity, related));
        visiting.remove(&id);
        result
    }

    /// Undo everything the current `stage` call did.
    fn rollback_stage(&mut self) {
        let journal = std::mem::take(&mut self.journal);
        for entity in self.staged.drain(journal.staged_len..) {
            self.staged_ids.remove(&entity.identity());
        }
        self.aliases.truncate(journal.aliases_len);
        for entity in &journal.indexed {
            self.index.remove(entity);
        }
        for (entity, before, was_indexed) in journal.saved.into_iter().rev() {
            self.index.remove(&entity);
            *entity.write() = before;
            if was_indexed {
                self.index.insert(&entity);
            }
        }
    }

    /// Stage related entities, returning relationship values that point at
    /// the staged handles.
    fn stage_related(
        &mut self,
        taken: &[(usize, RelationshipValue)],
        visiting: &mut HashSet<usize>,
    ) -> Result<Vec<(usize, RelationshipValue)>> {
        let mut staged = Vec::with_capacity(taken.len());
        for (index, value) in taken {
            let value = match value {
                RelationshipValue::ToOne(None) => RelationshipValue::ToOne(None),
                RelationshipValue::ToOne(Some(related)) => {
                    RelationshipValue::ToOne(Some(self.stage_graph(related.clone(), visiting)?))
                }
                RelationshipValue::ToMany(set) => {
                    let mut canonical = RelatedSet::new();
                    for related in set.iter() {
                        canonical.insert(self.stage_graph(related.clone(), visiting)?);
                    }
                    RelationshipValue::ToMany(canonical)
                }
            };
            staged.push((*index, value));
        }
        Ok(staged)
    }

    /// The handle `entity` collapses to.
    fn canonical(&self, entity: &EntityRef) -> Result<EntityRef> {
        if entity.state() == EntityState::Persisted {
            return Ok(entity.clone());
        }
        let (table, key) = {
            let e = entity.read();
            (e.table_name(), e.natural_key())
        };
        if let Some(existing) = self.index.find(table, &key) {
            return Ok(existing);
        }
        if self.config.dedupe_on_stage {
            return find_or_new(&self.context(), entity);
        }
        Ok(entity.clone())
    }

    fn place(
        &mut self,
        entity: &EntityRef,
        related: Vec<(usize, RelationshipValue)>,
    ) -> Result<EntityRef> {
        let canonical = self.canonical(entity)?;

        if canonical.ptr_eq(entity) {
            {
                let mut e = entity.write();
                e.restore_relationships(related);
                if e.state() != EntityState::Persisted {
                    e.set_state(EntityState::Staged);
                }
            }
            self.index_entity(entity);
            self.track(entity);
            return Ok(entity.clone());
        }

        tracing::trace!(table = entity.table_name(), "collapsed onto existing entity");
        self.journal.save(&canonical, &self.index);
        entity.write().restore_relationships(related.clone());
        if canonical.state() != EntityState::Persisted {
            let source = entity.read().clone();
            canonical.write().fill_unset(&source);
        }
        merge_relationships(&canonical, related)?;
        follow(entity, &canonical);
        self.aliases.push((entity.clone(), canonical.clone()));
        self.index_entity(&canonical);
        self.track(&canonical);
        Ok(canonical)
    }

    fn index_entity(&mut self, entity: &EntityRef) {
        if self.index.insert(entity) {
            self.journal.indexed.push(entity.clone());
        }
    }

    /// Queue `entity` for the next commit if it has anything to write.
    fn track(&mut self, entity: &EntityRef) {
        let writes = {
            let e = entity.read();
            e.state() != EntityState::Persisted || e.has_relationships()
        };
        if writes && self.staged_ids.insert(entity.identity()) {
            self.staged.push(entity.clone());
        }
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Resolve and write every staged entity.
    ///
    /// The staged list is cleared whether or not the commit succeeds. On
    /// success every written entity is persisted; on failure only entities
    /// of committed tables are, the others return to transient.
    #[tracing::instrument(level = "info", skip(self), fields(staged = self.staged.len()))]
    pub fn commit(&mut self) -> Result<CommitReport> {
        let start = Instant::now();
        let staged = std::mem::take(&mut self.staged);
        let aliases = std::mem::take(&mut self.aliases);
        self.staged_ids.clear();
        self.index.clear();
        self.phase = CommitPhase::Collecting;

        if staged.is_empty() {
            self.phase = CommitPhase::Done;
            tracing::debug!("nothing staged");
            return Ok(CommitReport::default());
        }

        self.phase = CommitPhase::Resolving;
        let ctx = CommitContext::new(&self.schema, &self.store, &self.config);
        let plan = match FlushPlan::build(&ctx, &self.order, &staged) {
            Ok(plan) => plan,
            Err(e) => {
                settle(&staged, &FlushPlan::default(), |_| false);
                settle_aliases(&aliases);
                self.phase = CommitPhase::Failed;
                tracing::warn!(error = %e, "resolution failed, nothing written");
                return Err(e);
            }
        };

        self.phase = CommitPhase::Flushing;
        match execute_plan(&ctx, &plan) {
            Ok(tables) => {
                settle(&staged, &plan, |_| true);
                settle_aliases(&aliases);
                self.phase = CommitPhase::Done;
                let report = CommitReport {
                    tables,
                    elapsed: start.elapsed(),
                    entities: staged.len(),
                };
                tracing::info!(
                    elapsed_ms = report.elapsed.as_millis(),
                    tables = report.tables.len(),
                    rows = report.total_rows(),
                    statements = report.statements(),
                    "Commit complete"
                );
                Ok(report)
            }
            Err(e) => {
                let committed = e.committed_tables();
                settle(&staged, &plan, |t| committed.iter().any(|c| c == t));
                settle_aliases(&aliases);
                self.phase = CommitPhase::Failed;
                Err(e)
            }
        }
    }
}

impl<S: Store + 'static> BulkSession<S> {
    /// Commit on a worker thread when the store accepts concurrent writers,
    /// inline otherwise.
    pub fn dispatch_commit(mut self) -> PendingCommit<S> {
        if self.store.supports_concurrent_writers() {
            tracing::debug!(backend = self.store.backend_name(), "dispatching commit to worker thread");
            let handle = std::thread::spawn(move || {
                let result = self.commit();
                (self, result)
            });
            PendingCommit {
                inner: Pending::Running(handle),
            }
        } else {
            let result = self.commit();
            PendingCommit {
                inner: Pending::Ready(Box::new(self), result),
            }
        }
    }
}

fn merge_relationships(canonical: &EntityRef, related: Vec<(usize, RelationshipValue)>) -> Result<()> {
    let mut target = canonical.write();
    for (index, value) in related {
        let Some(name) = target.table().relationships.get(index).map(|r| r.name) else {
            continue;
        };
        if target.relationship(name).is_none() {
            target.set_relationship(name, value)?;
            continue;
        }
        for entity in value.entities() {
            target.relate(name, entity)?;
        }
    }
    Ok(())
}

/// Give a merged handle the state of the handle it was merged into, and
/// once that one is stored, the column values it lacks.
fn follow(merged: &EntityRef, surviving: &EntityRef) {
    let source = surviving.read().clone();
    let mut target = merged.write();
    if source.state() == EntityState::Persisted {
        target.fill_unset(&source);
    }
    target.set_state(source.state());
}

fn settle_aliases(aliases: &[(EntityRef, EntityRef)]) {
    for (merged, surviving) in aliases {
        follow(merged, surviving);
    }
}

/// Record the outcome of a commit on the staged entities.
fn settle(staged: &[EntityRef], plan: &FlushPlan, committed: impl Fn(&str) -> bool) {
    for entity in staged {
        let mut e = entity.write();
        if e.state() == EntityState::Staged {
            e.set_state(EntityState::Transient);
        }
    }
    for table in plan.tables().filter(|&t| committed(t)) {
        for entity in plan.owners(table) {
            entity.write().set_state(EntityState::Persisted);
        }
    }
}

// ============================================================================
// Dispatched Commits
// ============================================================================

enum Pending<S: Store> {
    Ready(Box<BulkSession<S>>, Result<CommitReport>),
    Running(JoinHandle<(BulkSession<S>, Result<CommitReport>)>),
}

/// A commit started by [`BulkSession::dispatch_commit`].
pub struct PendingCommit<S: Store> {
    inner: Pending<S>,
}

impl<S: Store> PendingCommit<S> {
    /// Has the commit finished?
    pub fn is_finished(&self) -> bool {
        match &self.inner {
            Pending::Ready(..) => true,
            Pending::Running(handle) => handle.is_finished(),
        }
    }

    /// Wait for the commit, returning the session and its outcome.
    ///
    /// A panic on the worker thread is resumed on the caller.
    pub fn wait(self) -> (BulkSession<S>, Result<CommitReport>) {
        match self.inner {
            Pending::Ready(session, result) => (*session, result),
            Pending::Running(handle) => match handle.join() {
                Ok(outcome) => outcome,
                Err(panic) => std::panic::resume_unwind(panic),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockStore, quotes_schema};
    use sqlbatch_core::{ColumnInfo, Row, SqlType, TableInfo, Value};
    use sqlbatch_query::InsertKind;

    fn session(store: MockStore) -> BulkSession<MockStore> {
        BulkSession::new(quotes_schema(), store, BulkConfig::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_cyclic_schema() {
        const A: &[ColumnInfo] = &[
            ColumnInfo::new("id", SqlType::Integer).primary_key(),
            ColumnInfo::new("b_id", SqlType::Integer).foreign_key("b.id"),
        ];
        const B: &[ColumnInfo] = &[
            ColumnInfo::new("id", SqlType::Integer).primary_key(),
            ColumnInfo::new("a_id", SqlType::Integer).foreign_key("a.id"),
        ];
        let schema = Schema::new(vec![TableInfo::new("a", A), TableInfo::new("b", B)]).unwrap();
        let err = BulkSession::new(schema, MockStore::new(), BulkConfig::default())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Config(ref c) if c.kind == ConfigErrorKind::CyclicDependency
        ));
    }

    #[test]
    fn test_new_rejects_bad_override() {
        let config = BulkConfig::default().with_override("publisher", InsertKind::Upsert);
        assert!(BulkSession::new(quotes_schema(), MockStore::new(), config).is_err());
    }

    #[test]
    fn test_stage_cascades_through_relationships() {
        let mut session = session(MockStore::new());
        let schema = Arc::clone(session.schema());
        let author = schema.entity("author").unwrap().with("name", "Kennedy").unwrap().into_ref();
        let tag = schema.entity("tag").unwrap().with("name", "change").unwrap().into_ref();
        let quote = schema
            .entity("quote")
            .unwrap()
            .with("quote", "Ask not")
            .unwrap()
            .with_related("author", &author)
            .unwrap()
            .with_related("tags", &tag)
            .unwrap();
        let staged = session.stage(quote).unwrap();
        assert_eq!(session.pending(), 3);
        assert_eq!(staged.state(), EntityState::Staged);
        assert_eq!(author.state(), EntityState::Staged);
        // three natural-key lookups, one per entity
        assert_eq!(session.store().log().len(), 3);
    }

    #[test]
    fn test_equal_entities_collapse_within_a_batch() {
        let mut session = session(MockStore::new());
        let schema = Arc::clone(session.schema());
        let first = session
            .stage(schema.entity("tag").unwrap().with("name", "change").unwrap())
            .unwrap();
        let second = session
            .stage(schema.entity("tag").unwrap().with("name", "change").unwrap())
            .unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(session.pending(), 1);

        let report = session.commit().unwrap();
        assert_eq!(report.rows_for("tag"), 1);
        assert_eq!(first.state(), EntityState::Persisted);
    }

    #[test]
    fn test_related_entity_is_replaced_by_stored_row() {
        let store = MockStore::new();
        store.respond(vec![Row::new(
            vec!["id".into(), "name".into(), "birthday".into(), "bio".into()],
            vec![Value::BigInt(4), Value::from("Einstein"), Value::Null, Value::Null],
        )]);
        let mut session = session(store);
        let schema = Arc::clone(session.schema());
        let author = schema.entity("author").unwrap().with("name", "Einstein").unwrap().into_ref();
        let quote = schema
            .entity("quote")
            .unwrap()
            .with("quote", "Imagination is more important than knowledge")
            .unwrap()
            .with_related("author", &author)
            .unwrap();
        let quote = session.stage(quote).unwrap();
        // author found in the store, only the quote is pending
        assert_eq!(session.pending(), 1);

        let report = session.commit().unwrap();
        assert_eq!(report.rows_for("author"), 0);
        let quote_report = report.table("quote").unwrap();
        assert_eq!(quote_report.shape, StatementShape::Parameterized);
        let params = session.store().params();
        assert_eq!(
            params.last().unwrap(),
            &vec![
                Value::BigInt(4),
                Value::from("Imagination is more important than knowledge")
            ]
        );
        assert_eq!(quote.state(), EntityState::Persisted);
    }

    #[test]
    fn test_matched_root_keeps_its_relationships() {
        let store = MockStore::new();
        store.respond(Vec::new());
        store.respond(vec![Row::new(
            vec!["id".into(), "author_id".into(), "quote".into()],
            vec![Value::BigInt(10), Value::Null, Value::from("Ask not")],
        )]);
        let mut session = session(store);
        let schema = Arc::clone(session.schema());
        let tag = schema.entity("tag").unwrap().with("name", "change").unwrap().into_ref();
        let quote = schema
            .entity("quote")
            .unwrap()
            .with("quote", "Ask not")
            .unwrap()
            .with_related("tags", &tag)
            .unwrap();
        let stored = session.stage(quote).unwrap();
        assert_eq!(stored.state(), EntityState::Persisted);
        assert_eq!(session.pending(), 2);

        let report = session.commit().unwrap();
        assert_eq!(report.rows_for("quote"), 0);
        assert_eq!(report.rows_for("tag"), 1);
        assert_eq!(report.rows_for("quote_tag"), 1);
        let last = session.store().inserts().pop().unwrap();
        assert_eq!(
            last,
            "INSERT OR IGNORE INTO \"quote_tag\" (\"quote_id\", \"tag_id\") VALUES \
             (10, (SELECT \"id\" FROM \"tag\" WHERE \"name\" = 'change' LIMIT 1))"
        );
    }

    #[test]
    fn test_failed_commit_settles_states_and_clears_batch() {
        let store = MockStore::new();
        store.fail_on("INTO \"quote\"");
        let mut session = session(store);
        let schema = Arc::clone(session.schema());
        let author = schema.entity("author").unwrap().with("name", "Kennedy").unwrap().into_ref();
        let quote = schema
            .entity("quote")
            .unwrap()
            .with("quote", "Ask not")
            .unwrap()
            .with_related("author", &author)
            .unwrap()
            .into_ref();
        session.stage(quote.clone()).unwrap();

        let err = session.commit().unwrap_err();
        assert_eq!(err.committed_tables(), ["author"]);
        assert_eq!(session.phase(), CommitPhase::Failed);
        assert_eq!(session.pending(), 0);
        assert_eq!(author.state(), EntityState::Persisted);
        assert_eq!(quote.state(), EntityState::Transient);
    }

    #[test]
    fn test_failed_stage_leaves_batch_unchanged() {
        let store = MockStore::new();
        store.respond(Vec::new());
        store.respond(Vec::new());
        store.respond(vec![
            Row::new(
                vec!["id".into(), "author_id".into(), "quote".into()],
                vec![Value::BigInt(1), Value::Null, Value::from("Ask not")],
            ),
            Row::new(
                vec!["id".into(), "author_id".into(), "quote".into()],
                vec![Value::BigInt(2), Value::Null, Value::from("Ask not")],
            ),
        ]);
        let config = BulkConfig::default().with_ambiguity(AmbiguityPolicy::Error);
        let mut session = BulkSession::new(quotes_schema(), store, config).unwrap();
        let schema = Arc::clone(session.schema());
        let change = session
            .stage(schema.entity("tag").unwrap().with("name", "change").unwrap())
            .unwrap();

        let again = schema.entity("tag").unwrap().with("name", "change").unwrap().into_ref();
        let duty = schema.entity("tag").unwrap().with("name", "duty").unwrap().into_ref();
        let quote = schema
            .entity("quote")
            .unwrap()
            .with("quote", "Ask not")
            .unwrap()
            .with_related("tags", &again)
            .unwrap()
            .with_related("tags", &duty)
            .unwrap()
            .into_ref();
        let err = session.stage(quote.clone()).unwrap_err();
        assert!(matches!(err, Error::AmbiguousMatch(_)));

        assert_eq!(session.pending(), 1);
        assert_eq!(again.state(), EntityState::Transient);
        assert_eq!(duty.state(), EntityState::Transient);
        assert_eq!(quote.state(), EntityState::Transient);
        let tags = quote
            .read()
            .relationship("tags")
            .map(RelationshipValue::entities)
            .unwrap();
        assert_eq!(tags.len(), 2);
        assert!(tags[0].ptr_eq(&again));
        assert!(tags[1].ptr_eq(&duty));

        let report = session.commit().unwrap();
        assert_eq!(report.total_rows(), 1);
        assert_eq!(report.rows_for("tag"), 1);
        assert_eq!(change.state(), EntityState::Persisted);
        assert_eq!(duty.state(), EntityState::Transient);
        assert_eq!(session.store().inserts().len(), 1);
    }

    #[test]
    fn test_merged_handle_keeps_relationships_and_follows_commit() {
        let mut session = session(MockStore::new());
        let schema = Arc::clone(session.schema());
        let a = schema.entity("tag").unwrap().with("name", "a").unwrap().into_ref();
        let b = schema.entity("tag").unwrap().with("name", "b").unwrap().into_ref();
        let first = schema
            .entity("quote")
            .unwrap()
            .with("quote", "q")
            .unwrap()
            .with_related("tags", &a)
            .unwrap()
            .into_ref();
        let second = schema
            .entity("quote")
            .unwrap()
            .with("quote", "q")
            .unwrap()
            .with_related("tags", &b)
            .unwrap()
            .into_ref();
        session.stage(first.clone()).unwrap();
        let canonical = session.stage(second.clone()).unwrap();
        assert!(canonical.ptr_eq(&first));

        let own = second
            .read()
            .relationship("tags")
            .map(RelationshipValue::entities)
            .unwrap();
        assert_eq!(own.len(), 1);
        assert!(own[0].ptr_eq(&b));
        let merged = first
            .read()
            .relationship("tags")
            .map(RelationshipValue::entities)
            .unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(second.state(), EntityState::Staged);

        let report = session.commit().unwrap();
        assert_eq!(report.rows_for("quote"), 1);
        assert_eq!(report.rows_for("quote_tag"), 2);
        assert_eq!(first.state(), EntityState::Persisted);
        assert_eq!(second.state(), EntityState::Persisted);
    }

    #[test]
    fn test_resolution_failure_writes_nothing() {
        let mut session = session(MockStore::new());
        let schema = Arc::clone(session.schema());
        let anonymous = schema
            .entity("author")
            .unwrap()
            .with("birthday", Value::date(1900, 1, 1))
            .unwrap()
            .into_ref();
        let quote = schema
            .entity("quote")
            .unwrap()
            .with("quote", "?")
            .unwrap()
            .with_related("author", &anonymous)
            .unwrap();
        session.stage(quote).unwrap();
        let err = session.commit().unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
        assert!(session.store().inserts().is_empty());
        assert_eq!(anonymous.state(), EntityState::Transient);
    }

    #[test]
    fn test_empty_commit() {
        let mut session = session(MockStore::new());
        let report = session.commit().unwrap();
        assert!(report.tables.is_empty());
        assert_eq!(session.phase(), CommitPhase::Done);
    }

    #[test]
    fn test_dispatch_inline_and_threaded() {
        let mut inline = session(MockStore::new());
        let schema = Arc::clone(inline.schema());
        inline
            .stage(schema.entity("tag").unwrap().with("name", "a").unwrap())
            .unwrap();
        let pending = inline.dispatch_commit();
        assert!(pending.is_finished());
        let (inline, result) = pending.wait();
        assert_eq!(result.unwrap().rows_for("tag"), 1);
        assert_eq!(inline.phase(), CommitPhase::Done);

        let mut threaded =
            BulkSession::new(quotes_schema(), MockStore::concurrent(), BulkConfig::default())
                .unwrap();
        threaded
            .stage(schema.entity("tag").unwrap().with("name", "b").unwrap())
            .unwrap();
        let (threaded, result) = threaded.dispatch_commit().wait();
        assert_eq!(result.unwrap().rows_for("tag"), 1);
        assert_eq!(threaded.into_store().inserts().len(), 1);
    }
}
