//! Shared fixtures for the unit tests of this crate.

use sqlbatch_core::{
    ColumnInfo, Error, QueryError, QueryErrorKind, RelationshipInfo, Result, Row, Schema, SqlType,
    Store, TableInfo, Value,
};
use std::collections::VecDeque;
use std::sync::Mutex;

const AUTHOR: &[ColumnInfo] = &[
    ColumnInfo::new("id", SqlType::Integer).primary_key().auto_increment(),
    ColumnInfo::new("name", SqlType::Text).unique(),
    ColumnInfo::new("birthday", SqlType::Date).nullable(),
    ColumnInfo::new("bio", SqlType::Text).nullable(),
];
const QUOTE: &[ColumnInfo] = &[
    ColumnInfo::new("id", SqlType::Integer).primary_key(),
    ColumnInfo::new("author_id", SqlType::Integer)
        .nullable()
        .foreign_key("author.id"),
    ColumnInfo::new("quote", SqlType::Text).unique(),
];
const TAG: &[ColumnInfo] = &[
    ColumnInfo::new("id", SqlType::Integer).primary_key(),
    ColumnInfo::new("name", SqlType::Text).unique(),
];
const QUOTE_TAG: &[ColumnInfo] = &[
    ColumnInfo::new("quote_id", SqlType::Integer).foreign_key("quote.id"),
    ColumnInfo::new("tag_id", SqlType::Integer).foreign_key("tag.id"),
];
const QUOTE_RELS: &[RelationshipInfo] = &[
    RelationshipInfo::many_to_one("author", "author", &[("author_id", "id")]),
    RelationshipInfo::many_to_many(
        "tags",
        "tag",
        "quote_tag",
        &[("id", "quote_id")],
        &[("id", "tag_id")],
    ),
];

pub fn quotes_schema() -> Schema {
    Schema::new(vec![
        TableInfo::new("author", AUTHOR),
        TableInfo::new("quote", QUOTE).with_relationships(QUOTE_RELS),
        TableInfo::new("tag", TAG),
        TableInfo::new("quote_tag", QUOTE_TAG),
    ])
    .unwrap()
}

#[derive(Default)]
struct MockState {
    log: Vec<String>,
    params: Vec<Vec<Value>>,
    responses: VecDeque<Vec<Row>>,
    fail_on: Option<String>,
}

/// In-memory store that records statements and replays canned query results.
#[derive(Default)]
pub struct MockStore {
    state: Mutex<MockState>,
    concurrent: bool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn concurrent() -> Self {
        Self {
            concurrent: true,
            ..Self::default()
        }
    }

    /// Queue the rows returned by the next `query` call.
    pub fn respond(&self, rows: Vec<Row>) {
        self.state.lock().unwrap().responses.push_back(rows);
    }

    /// Fail every statement whose text contains `needle`.
    pub fn fail_on(&self, needle: &str) {
        self.state.lock().unwrap().fail_on = Some(needle.to_string());
    }

    /// Every call, in order: SQL text or `BEGIN` / `COMMIT` / `ROLLBACK`.
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Executed INSERT statements.
    pub fn inserts(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter(|s| s.starts_with("INSERT"))
            .collect()
    }

    pub fn params(&self) -> Vec<Vec<Value>> {
        self.state.lock().unwrap().params.clone()
    }
}

impl Store for MockStore {
    fn backend_name(&self) -> &'static str {
        "mock"
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut state = self.state.lock().unwrap();
        state.log.push(sql.to_string());
        state.params.push(params.to_vec());
        Ok(state.responses.pop_front().unwrap_or_default())
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.log.push(sql.to_string());
        state.params.push(params.to_vec());
        if state.fail_on.as_deref().is_some_and(|n| sql.contains(n)) {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Constraint,
                sql: Some(sql.to_string()),
                message: "CHECK constraint failed".to_string(),
                source: None,
            }));
        }
        Ok(1)
    }

    fn begin(&self) -> Result<()> {
        self.state.lock().unwrap().log.push("BEGIN".to_string());
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.state.lock().unwrap().log.push("COMMIT".to_string());
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.state.lock().unwrap().log.push("ROLLBACK".to_string());
        Ok(())
    }

    fn supports_concurrent_writers(&self) -> bool {
        self.concurrent
    }
}
