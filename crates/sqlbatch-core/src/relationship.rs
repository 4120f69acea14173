//! Relationship metadata.
//!
//! Relationships are declared once per table as static descriptors and shared
//! by every entity of that table. The bulk-commit engine reads them to turn
//! related entities into foreign-key column values and join-table rows.

/// Whether a relationship holds one related entity or a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Many-to-one: the owner carries the foreign key columns.
    ToOne,
    /// Many-to-many through a join (secondary) table.
    ToMany,
}

impl Direction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Direction::ToOne => "to-one",
            Direction::ToMany => "to-many",
        }
    }
}

/// Static description of one relationship of a table.
///
/// ```
/// use sqlbatch_core::{Direction, RelationshipInfo};
///
/// const QUOTE_AUTHOR: RelationshipInfo =
///     RelationshipInfo::many_to_one("author", "author", &[("author_id", "id")]);
/// const QUOTE_TAGS: RelationshipInfo = RelationshipInfo::many_to_many(
///     "tags",
///     "tag",
///     "quote_tag",
///     &[("id", "quote_id")],
///     &[("id", "tag_id")],
/// );
///
/// assert_eq!(QUOTE_AUTHOR.direction, Direction::ToOne);
/// assert_eq!(QUOTE_TAGS.secondary, Some("quote_tag"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipInfo {
    /// Name of the relationship on the owning entity.
    pub name: &'static str,
    /// Table of the related entities.
    pub target: &'static str,
    pub direction: Direction,
    /// `(local column, remote column)` pairs for to-one relationships.
    pub local_remote_pairs: &'static [(&'static str, &'static str)],
    /// Join table for to-many relationships.
    pub secondary: Option<&'static str>,
    /// `(owner column, join column)` pairs.
    pub synchronize_pairs: &'static [(&'static str, &'static str)],
    /// `(related column, join column)` pairs.
    pub secondary_synchronize_pairs: &'static [(&'static str, &'static str)],
}

impl RelationshipInfo {
    /// A many-to-one relationship whose foreign key lives on the owner.
    pub const fn many_to_one(
        name: &'static str,
        target: &'static str,
        local_remote_pairs: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self {
            name,
            target,
            direction: Direction::ToOne,
            local_remote_pairs,
            secondary: None,
            synchronize_pairs: &[],
            secondary_synchronize_pairs: &[],
        }
    }

    /// A many-to-many relationship through `secondary`.
    pub const fn many_to_many(
        name: &'static str,
        target: &'static str,
        secondary: &'static str,
        synchronize_pairs: &'static [(&'static str, &'static str)],
        secondary_synchronize_pairs: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self {
            name,
            target,
            direction: Direction::ToMany,
            local_remote_pairs: &[],
            secondary: Some(secondary),
            synchronize_pairs,
            secondary_synchronize_pairs,
        }
    }

    /// Is this a collection-valued relationship?
    pub const fn is_collection(&self) -> bool {
        matches!(self.direction, Direction::ToMany)
    }
}
