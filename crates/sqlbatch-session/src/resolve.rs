//! Relationship resolution.
//!
//! Every foreign-key or join column is filled by the first tier that applies:
//!
//! 1. the column already holds a concrete value: keep it;
//! 2. the related entity holds the referenced column: copy it;
//! 3. otherwise defer to the database with a subquery over the related
//!    entity's natural key.

use crate::context::CommitContext;
use sqlbatch_core::{
    ColumnValue, ConfigErrorKind, Direction, Entity, EntityState, Error, ParamRow,
    RelationshipInfo, RelationshipValue, ResolutionErrorKind, Result, Store, SubqueryExpr, Value,
};

/// Rows produced by resolving one staged entity.
#[derive(Debug, Default)]
pub struct Resolved {
    /// The entity's own row; `None` for persisted entities.
    pub own: Option<ParamRow>,
    /// `(join table, row)` pairs from to-many relationships.
    pub joins: Vec<(&'static str, ParamRow)>,
}

/// Resolve one column against `related.remote`.
pub fn resolve_column(
    local: Option<&Value>,
    related: &Entity,
    remote: &'static str,
) -> Result<ColumnValue> {
    if let Some(value) = local.filter(|v| !v.is_null()) {
        return Ok(ColumnValue::Concrete(value.clone()));
    }
    if let Some(value) = related.get(remote) {
        return Ok(ColumnValue::Concrete(value.clone()));
    }
    let filters = related.lookup_key();
    if filters.is_empty() {
        return Err(Error::resolution(
            ResolutionErrorKind::EmptyFilter,
            related.table_name(),
            Some(remote),
            "related entity has neither the referenced column nor a natural key to look it up by",
        ));
    }
    Ok(ColumnValue::Deferred(SubqueryExpr {
        table: related.table_name(),
        select_column: remote,
        filters,
    }))
}

fn check_target(owner: &Entity, rel: &RelationshipInfo, related: &Entity) -> Result<()> {
    if related.table_name() == rel.target {
        return Ok(());
    }
    Err(Error::resolution(
        ResolutionErrorKind::WrongEntityType,
        owner.table_name(),
        Some(rel.name),
        format!(
            "expected a '{}' entity, got '{}'",
            rel.target,
            related.table_name()
        ),
    ))
}

fn shape_mismatch(owner: &Entity, rel: &RelationshipInfo, value: &RelationshipValue) -> Error {
    Error::resolution(
        ResolutionErrorKind::ShapeMismatch,
        owner.table_name(),
        Some(rel.name),
        format!(
            "{} relationship holds a {} value",
            rel.direction.as_str(),
            value.direction().as_str()
        ),
    )
}

/// Resolve a many-to-one relationship into `(local column, value)` pairs.
///
/// An empty relationship contributes nothing.
pub fn resolve_to_one(
    owner: &Entity,
    rel: &RelationshipInfo,
    value: &RelationshipValue,
) -> Result<Vec<(&'static str, ColumnValue)>> {
    let related = match value {
        RelationshipValue::ToOne(Some(related)) => related,
        RelationshipValue::ToOne(None) => return Ok(Vec::new()),
        RelationshipValue::ToMany(_) => return Err(shape_mismatch(owner, rel, value)),
    };
    let related = related.read();
    check_target(owner, rel, &related)?;
    rel.local_remote_pairs
        .iter()
        .map(|&(local, remote)| Ok((local, resolve_column(owner.get(local), &related, remote)?)))
        .collect()
}

/// Resolve a many-to-many relationship into one join row per related entity.
pub fn resolve_to_many(
    owner: &Entity,
    rel: &RelationshipInfo,
    value: &RelationshipValue,
) -> Result<Vec<ParamRow>> {
    let RelationshipValue::ToMany(set) = value else {
        return Err(shape_mismatch(owner, rel, value));
    };
    let mut rows = Vec::with_capacity(set.len());
    for handle in set.iter() {
        let related = handle.read();
        check_target(owner, rel, &related)?;
        let mut row = ParamRow::new();
        for &(owner_col, join_col) in rel.synchronize_pairs {
            row.set(join_col, resolve_column(None, owner, owner_col)?);
        }
        for &(related_col, join_col) in rel.secondary_synchronize_pairs {
            row.set(join_col, resolve_column(None, &related, related_col)?);
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Resolve every relationship of `entity` and build its rows.
///
/// The own row lists columns in declaration order: loaded values, with
/// foreign keys filled in from to-one relationships. Persisted entities
/// produce join rows only.
pub fn resolve_entity<S: Store + ?Sized>(
    ctx: &CommitContext<'_, S>,
    entity: &Entity,
) -> Result<Resolved> {
    let table = ctx.schema.table_of(entity.table_name()).ok_or_else(|| {
        Error::config(
            ConfigErrorKind::UnknownTable,
            format!("entity of unknown table '{}'", entity.table_name()),
        )
    })?;
    let persisted = entity.state() == EntityState::Persisted;

    let mut foreign: Vec<(&'static str, ColumnValue)> = Vec::new();
    let mut joins = Vec::new();
    for (rel, value) in entity.relationships() {
        match rel.direction {
            Direction::ToOne if persisted => {}
            Direction::ToOne => foreign.extend(resolve_to_one(entity, rel, value)?),
            Direction::ToMany => {
                let Some(secondary) = rel.secondary else {
                    continue;
                };
                joins.extend(
                    resolve_to_many(entity, rel, value)?
                        .into_iter()
                        .map(|row| (secondary, row)),
                );
            }
        }
    }

    let own = if persisted {
        None
    } else {
        let mut row = ParamRow::new();
        for column in table.columns {
            let resolved = foreign
                .iter()
                .rev()
                .find(|(name, _)| *name == column.name)
                .map(|(_, v)| v.clone());
            if let Some(value) = resolved {
                row.set(column.name, value);
            } else if let Some(value) = entity.get(column.name) {
                row.set(column.name, value.clone());
            }
        }
        Some(row)
    };

    tracing::trace!(
        table = entity.table_name(),
        own = own.as_ref().map_or(0, ParamRow::len),
        joins = joins.len(),
        "resolved entity"
    );
    Ok(Resolved { own, joins })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BulkConfig;
    use crate::testing::{MockStore, quotes_schema};
    use sqlbatch_core::RelatedSet;

    #[test]
    fn test_three_tiers() {
        let schema = quotes_schema();
        let kennedy = schema.entity("author").unwrap().with("name", "Kennedy").unwrap();
        let stored = schema
            .entity("author")
            .unwrap()
            .with("id", 7)
            .unwrap()
            .with("name", "Einstein")
            .unwrap();

        // tier 1
        let local = Value::BigInt(3);
        assert_eq!(
            resolve_column(Some(&local), &kennedy, "id").unwrap(),
            ColumnValue::Concrete(Value::BigInt(3))
        );
        // tier 2
        assert_eq!(
            resolve_column(None, &stored, "id").unwrap(),
            ColumnValue::Concrete(Value::Int(7))
        );
        // tier 3
        assert_eq!(
            resolve_column(None, &kennedy, "id").unwrap(),
            ColumnValue::Deferred(SubqueryExpr::new("author", "id").filter("name", "Kennedy"))
        );
    }

    #[test]
    fn test_deferred_filter_skips_temporal_columns() {
        let schema = quotes_schema();
        let author = schema
            .entity("author")
            .unwrap()
            .with("name", "Kennedy")
            .unwrap()
            .with("birthday", Value::date(1917, 5, 29))
            .unwrap();
        let ColumnValue::Deferred(subquery) = resolve_column(None, &author, "id").unwrap() else {
            panic!("expected a deferred value");
        };
        assert_eq!(subquery.filters, vec![("name", Value::from("Kennedy"))]);

        let only_birthday = schema
            .entity("author")
            .unwrap()
            .with("birthday", Value::date(1917, 5, 29))
            .unwrap();
        let err = resolve_column(None, &only_birthday, "id").unwrap_err();
        assert!(matches!(
            err,
            Error::Resolution(ref r) if r.kind == ResolutionErrorKind::EmptyFilter
        ));
    }

    #[test]
    fn test_own_row_fills_foreign_key_in_column_order() {
        let schema = quotes_schema();
        let store = MockStore::new();
        let config = BulkConfig::default();
        let ctx = CommitContext::new(&schema, &store, &config);

        let author = schema.entity("author").unwrap().with("name", "Kennedy").unwrap().into_ref();
        let quote = schema
            .entity("quote")
            .unwrap()
            .with("quote", "Ask not")
            .unwrap()
            .with_related("author", &author)
            .unwrap();
        let resolved = resolve_entity(&ctx, &quote).unwrap();
        let own = resolved.own.unwrap();
        assert_eq!(own.layout(), ["author_id", "quote"]);
        assert!(own.is_deferred());
        assert!(resolved.joins.is_empty());
    }

    #[test]
    fn test_explicit_foreign_key_wins() {
        let schema = quotes_schema();
        let author = schema.entity("author").unwrap().with("name", "Kennedy").unwrap();
        let quote = schema
            .entity("quote")
            .unwrap()
            .with("author_id", 12)
            .unwrap()
            .with_related("author", &author.into_ref())
            .unwrap();
        let rel = quote.table().relationship("author").unwrap();
        let pairs = resolve_to_one(&quote, rel, quote.relationship("author").unwrap()).unwrap();
        assert_eq!(pairs, vec![("author_id", ColumnValue::Concrete(Value::Int(12)))]);
    }

    #[test]
    fn test_empty_to_one_contributes_nothing() {
        let schema = quotes_schema();
        let mut quote = schema.entity("quote").unwrap().with("quote", "x").unwrap();
        quote
            .set_relationship("author", RelationshipValue::ToOne(None))
            .unwrap();
        let rel = quote.table().relationship("author").unwrap();
        let pairs = resolve_to_one(&quote, rel, quote.relationship("author").unwrap()).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_join_rows_per_related_entity() {
        let schema = quotes_schema();
        let a = schema.entity("tag").unwrap().with("name", "change").unwrap().into_ref();
        let b = schema
            .entity("tag")
            .unwrap()
            .with("id", 5)
            .unwrap()
            .with("name", "life")
            .unwrap()
            .into_ref();
        let quote = schema
            .entity("quote")
            .unwrap()
            .with("quote", "Ask not")
            .unwrap()
            .with_related("tags", &a)
            .unwrap()
            .with_related("tags", &b)
            .unwrap();
        let rel = quote.table().relationship("tags").unwrap();
        let rows = resolve_to_many(&quote, rel, quote.relationship("tags").unwrap()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].layout(), ["quote_id", "tag_id"]);
        assert_eq!(
            rows[0].get("quote_id"),
            Some(&ColumnValue::Deferred(
                SubqueryExpr::new("quote", "id").filter("quote", "Ask not")
            ))
        );
        assert_eq!(
            rows[1].get("tag_id"),
            Some(&ColumnValue::Concrete(Value::Int(5)))
        );

        let empty = RelationshipValue::ToMany(RelatedSet::new());
        assert!(resolve_to_many(&quote, rel, &empty).unwrap().is_empty());
    }

    #[test]
    fn test_shape_and_type_mismatches() {
        let schema = quotes_schema();
        let tag = schema.entity("tag").unwrap().with("name", "x").unwrap().into_ref();
        let mut quote = schema.entity("quote").unwrap().with("quote", "q").unwrap();

        quote
            .set_relationship(
                "author",
                RelationshipValue::ToMany(std::iter::once(tag.clone()).collect()),
            )
            .unwrap();
        let table = std::sync::Arc::clone(quote.table());
        let rel = table.relationship("author").unwrap();
        let err = resolve_to_one(&quote, rel, quote.relationship("author").unwrap()).unwrap_err();
        assert!(matches!(
            err,
            Error::Resolution(ref r) if r.kind == ResolutionErrorKind::ShapeMismatch
        ));

        quote
            .set_relationship("author", RelationshipValue::ToOne(Some(tag)))
            .unwrap();
        let err = resolve_to_one(&quote, rel, quote.relationship("author").unwrap()).unwrap_err();
        assert!(matches!(
            err,
            Error::Resolution(ref r) if r.kind == ResolutionErrorKind::WrongEntityType
        ));
        assert!(err.to_string().contains("quote.author"));
    }

    #[test]
    fn test_persisted_entity_yields_join_rows_only() {
        let schema = quotes_schema();
        let store = MockStore::new();
        let config = BulkConfig::default();
        let ctx = CommitContext::new(&schema, &store, &config);

        let tag = schema.entity("tag").unwrap().with("name", "wit").unwrap().into_ref();
        let mut quote = schema
            .entity("quote")
            .unwrap()
            .with("id", 1)
            .unwrap()
            .with("quote", "q")
            .unwrap()
            .with_related("tags", &tag)
            .unwrap();
        quote.set_state(EntityState::Persisted);
        let resolved = resolve_entity(&ctx, &quote).unwrap();
        assert!(resolved.own.is_none());
        assert_eq!(resolved.joins.len(), 1);
        assert_eq!(resolved.joins[0].0, "quote_tag");
    }
}
