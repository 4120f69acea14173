mod common;

use common::{author, count, names, quote, quotes_schema, session, tag};
use sqlbatch::prelude::*;
use sqlbatch::{CommitPhase, StatementShape};

const KENNEDY: &str = "Ask not what your country can do for you";

#[test]
fn sqlite_tables_are_written_parents_first() {
    let mut session = session();
    assert_eq!(
        session.order().tables(),
        ["author", "tag", "quote", "quote_tag"]
    );

    let schema = Arc::clone(session.schema());
    let kennedy = author(&schema, "Kennedy");
    let country = tag(&schema, "country");
    session
        .stage(quote(&schema, KENNEDY, &kennedy, &[&country]))
        .expect("stage quote");

    let report = session.commit().expect("commit");
    let written: Vec<&str> = report.tables.iter().map(|t| t.table).collect();
    assert_eq!(written, ["author", "tag", "quote", "quote_tag"]);
    assert_eq!(report.total_rows(), 4);
    assert_eq!(report.entities, 3);
}

#[test]
fn sqlite_tag_staged_twice_is_written_once() {
    let mut session = session();
    let schema = Arc::clone(session.schema());

    let first = session.stage(tag(&schema, "change")).expect("stage tag");
    let second = session.stage(tag(&schema, "change")).expect("stage tag again");
    assert!(first.ptr_eq(&second));
    assert_eq!(session.pending(), 1);
    session.commit().expect("first commit");
    assert_eq!(first.state(), EntityState::Persisted);

    let third = session.stage(tag(&schema, "change")).expect("stage in next batch");
    assert_eq!(third.state(), EntityState::Persisted);
    assert_eq!(third.get("id"), Some(Value::Int(1)));
    let report = session.commit().expect("second commit");
    assert_eq!(report.total_rows(), 0);

    assert_eq!(names(session.store(), "tag"), ["change"]);
}

#[test]
fn sqlite_deferred_author_id_points_at_new_author() {
    let mut session = session();
    let schema = Arc::clone(session.schema());

    session.execute_setup("INSERT INTO author (name) VALUES ('Austen'), ('Twain')");
    let kennedy = author(&schema, "Kennedy");
    session
        .stage(quote(&schema, KENNEDY, &kennedy, &[]))
        .expect("stage quote");

    let report = session.commit().expect("commit");
    assert_eq!(
        report.table("author").map(|t| t.shape),
        Some(StatementShape::Parameterized)
    );
    assert_eq!(
        report.table("quote").map(|t| t.shape),
        Some(StatementShape::Embedded)
    );

    let rows = session
        .store()
        .query(
            "SELECT quote.author_id AS author_id, author.id AS id \
             FROM quote, author WHERE author.name = ?1",
            &[Value::from("Kennedy")],
        )
        .expect("select quote");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_i64("author_id").expect("author_id"), 3);
    assert_eq!(rows[0].get_i64("id").expect("id"), 3);
}

#[test]
fn sqlite_two_tags_give_two_join_rows() {
    let mut session = session();
    let schema = Arc::clone(session.schema());

    let kennedy = author(&schema, "Kennedy");
    let country = tag(&schema, "country");
    let duty = tag(&schema, "duty");
    session
        .stage(quote(&schema, KENNEDY, &kennedy, &[&country, &duty]))
        .expect("stage quote");
    // Same tag again through another quote: still one tag row.
    session
        .stage(quote(&schema, "We choose to go to the moon", &kennedy, &[&duty]))
        .expect("stage second quote");

    let report = session.commit().expect("commit");
    assert_eq!(report.rows_for("quote_tag"), 3);

    let store = session.store();
    assert_eq!(count(store, "author"), 1);
    assert_eq!(names(store, "tag"), ["country", "duty"]);
    assert_eq!(count(store, "quote_tag"), 3);

    let rows = store
        .query(
            "SELECT tag.name AS name FROM quote_tag \
             JOIN quote ON quote.id = quote_tag.quote_id \
             JOIN tag ON tag.id = quote_tag.tag_id \
             WHERE quote.quote = ?1 ORDER BY tag.name",
            &[Value::from(KENNEDY)],
        )
        .expect("select join rows");
    let tags: Vec<&str> = rows
        .iter()
        .map(|r| r.get_str("name").expect("name"))
        .collect();
    assert_eq!(tags, ["country", "duty"]);
}

#[test]
fn sqlite_existing_author_is_reused() {
    let mut session = session();
    let schema = Arc::clone(session.schema());
    session.execute_setup(
        "INSERT INTO author (id, name, birthday) VALUES (4, 'Einstein', '1879-03-14')",
    );

    let staged = author(&schema, "Einstein");
    let einstein = session.stage(staged.clone()).expect("stage author");
    assert!(!einstein.ptr_eq(&staged));
    assert_eq!(einstein.state(), EntityState::Persisted);
    assert_eq!(einstein.get("id"), Some(Value::Int(4)));
    assert_eq!(einstein.get("birthday"), Some(Value::date(1879, 3, 14)));
    // the caller's handle picks up the stored row too
    assert_eq!(staged.state(), EntityState::Persisted);
    assert_eq!(staged.get("id"), Some(Value::Int(4)));

    let another = author(&schema, "Einstein");
    session
        .stage(quote(
            &schema,
            "Imagination is more important than knowledge",
            &another,
            &[],
        ))
        .expect("stage quote");

    let report = session.commit().expect("commit");
    assert_eq!(report.rows_for("author"), 0);
    assert_eq!(
        report.table("quote").map(|t| t.shape),
        Some(StatementShape::Parameterized)
    );

    let store = session.store();
    assert_eq!(count(store, "author"), 1);
    let rows = store
        .query("SELECT author_id FROM quote", &[])
        .expect("select quote");
    assert_eq!(rows[0].get_i64("author_id").expect("author_id"), 4);
}

#[test]
fn sqlite_upsert_override_replaces_author_details() {
    let config = BulkConfig::default()
        .with_override("author", InsertKind::Upsert)
        .with_dedupe_on_stage(false);
    let mut session = common::session_with(config);
    let schema = Arc::clone(session.schema());
    session.execute_setup("INSERT INTO author (name, bio) VALUES ('Curie', 'chemist')");

    let curie = schema
        .entity("author")
        .and_then(|e| e.with("name", "Curie"))
        .and_then(|e| e.with("bio", "physicist"))
        .expect("author entity");
    session.stage(curie).expect("stage author");
    session.commit().expect("commit");

    let rows = session
        .store()
        .query("SELECT bio FROM author WHERE name = 'Curie'", &[])
        .expect("select author");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("bio").expect("bio"), "physicist");
}

#[test]
fn sqlite_embedded_text_keeps_nul_bytes() {
    let mut session = session();
    let schema = Arc::clone(session.schema());

    let text = "Ask not\0what your country can do for you";
    let kennedy = author(&schema, "Kennedy");
    session
        .stage(quote(&schema, text, &kennedy, &[]))
        .expect("stage quote");

    let report = session.commit().expect("commit");
    assert_eq!(
        report.table("quote").map(|t| t.shape),
        Some(StatementShape::Embedded)
    );
    let rows = session
        .store()
        .query("SELECT quote FROM quote", &[])
        .expect("select quote");
    assert_eq!(rows[0].get_str("quote").expect("quote"), text);
}

#[test]
fn sqlite_large_batches_are_chunked() {
    let config = BulkConfig::default().with_max_rows_per_statement(2);
    let mut session = common::session_with(config);
    let schema = Arc::clone(session.schema());
    for name in ["a", "b", "c", "d", "e"] {
        session.stage(tag(&schema, name)).expect("stage tag");
    }

    let report = session.commit().expect("commit");
    assert_eq!(report.table("tag").map(|t| t.statements), Some(3));
    assert_eq!(count(session.store(), "tag"), 5);
}

#[test]
fn sqlite_inline_dispatch_for_single_writer_store() {
    let mut session = session();
    let schema = Arc::clone(session.schema());
    session.stage(tag(&schema, "life")).expect("stage tag");

    let pending = session.dispatch_commit();
    assert!(pending.is_finished());
    let (session, result) = pending.wait();
    let report = result.expect("commit");
    assert_eq!(report.rows_for("tag"), 1);
    assert_eq!(session.phase(), CommitPhase::Done);
    assert_eq!(session.pending(), 0);
}

trait SetupExt {
    fn execute_setup(&self, sql: &str);
}

impl SetupExt for BulkSession<SqliteStore> {
    fn execute_setup(&self, sql: &str) {
        self.store().execute_raw(sql).expect("setup statement");
    }
}

#[test]
fn sqlite_open_from_url() {
    let schema = quotes_schema();
    let session = sqlbatch::open_sqlite("sqlite://", Arc::clone(&schema)).expect("open session");
    assert_eq!(session.config().dialect, Dialect::Sqlite);
    assert_eq!(session.store().path(), ":memory:");

    let err = sqlbatch::open_sqlite("mysql://root@localhost/quotes", schema)
        .err()
        .expect("mysql URL is not a SQLite database");
    assert!(matches!(err, Error::Config(_)));
}
