//! Quotes schema shared by the SQLite end-to-end tests.

#![allow(dead_code)]

use sqlbatch::prelude::*;

pub const LONGEST_QUOTE: usize = 80;

const AUTHOR: &[ColumnInfo] = &[
    ColumnInfo::new("id", SqlType::Integer).primary_key().auto_increment(),
    ColumnInfo::new("name", SqlType::Text).unique(),
    ColumnInfo::new("birthday", SqlType::Date).nullable(),
    ColumnInfo::new("bio", SqlType::Text).nullable(),
];
const QUOTE: &[ColumnInfo] = &[
    ColumnInfo::new("id", SqlType::Integer).primary_key().auto_increment(),
    ColumnInfo::new("author_id", SqlType::Integer)
        .nullable()
        .foreign_key("author.id"),
    ColumnInfo::new("quote", SqlType::Text).unique(),
];
const TAG: &[ColumnInfo] = &[
    ColumnInfo::new("id", SqlType::Integer).primary_key().auto_increment(),
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

pub fn quotes_schema() -> Arc<Schema> {
    Arc::new(
        Schema::new(vec![
            TableInfo::new("author", AUTHOR),
            TableInfo::new("quote", QUOTE).with_relationships(QUOTE_RELS),
            TableInfo::new("tag", TAG),
            TableInfo::new("quote_tag", QUOTE_TAG),
        ])
        .expect("valid quotes schema"),
    )
}

/// In-memory database with the quotes tables created.
pub fn quotes_store() -> SqliteStore {
    let store = SqliteStore::open_memory().expect("open sqlite memory db");
    store
        .execute_raw(&format!(
            "CREATE TABLE author (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 name TEXT NOT NULL UNIQUE,
                 birthday DATE,
                 bio TEXT
             );
             CREATE TABLE quote (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 author_id INTEGER REFERENCES author(id),
                 quote TEXT NOT NULL UNIQUE CHECK (length(quote) <= {LONGEST_QUOTE})
             );
             CREATE TABLE tag (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 name TEXT NOT NULL UNIQUE
             );
             CREATE TABLE quote_tag (
                 quote_id INTEGER NOT NULL REFERENCES quote(id),
                 tag_id INTEGER NOT NULL REFERENCES tag(id),
                 PRIMARY KEY (quote_id, tag_id)
             );"
        ))
        .expect("create quotes tables");
    store
}

pub fn session_with(config: BulkConfig) -> BulkSession<SqliteStore> {
    BulkSession::new(quotes_schema(), quotes_store(), config).expect("create bulk session")
}

pub fn session() -> BulkSession<SqliteStore> {
    session_with(BulkConfig::default())
}

pub fn author(schema: &Schema, name: &str) -> EntityRef {
    schema
        .entity("author")
        .and_then(|e| e.with("name", name))
        .expect("author entity")
        .into_ref()
}

pub fn tag(schema: &Schema, name: &str) -> EntityRef {
    schema
        .entity("tag")
        .and_then(|e| e.with("name", name))
        .expect("tag entity")
        .into_ref()
}

pub fn quote(schema: &Schema, text: &str, author: &EntityRef, tags: &[&EntityRef]) -> EntityRef {
    let mut quote = schema
        .entity("quote")
        .and_then(|e| e.with("quote", text))
        .and_then(|e| e.with_related("author", author))
        .expect("quote entity");
    for tag in tags {
        quote.relate("tags", (*tag).clone()).expect("relate tag");
    }
    quote.into_ref()
}

pub fn count(store: &SqliteStore, table: &str) -> i64 {
    let rows = store
        .query(&format!("SELECT COUNT(*) AS n FROM {table}"), &[])
        .expect("count rows");
    rows[0].get_i64("n").expect("integer count")
}

pub fn names(store: &SqliteStore, table: &str) -> Vec<String> {
    store
        .query(&format!("SELECT name FROM {table} ORDER BY name"), &[])
        .expect("select names")
        .iter()
        .map(|row| row.get_str("name").expect("name").to_string())
        .collect()
}
