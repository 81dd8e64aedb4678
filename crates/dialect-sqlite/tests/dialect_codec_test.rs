use chrono::{TimeZone, Utc};
use recordsync_core::{ColumnKind, ConstraintKind, Dialect, Error, RawValue};
use recordsync_dialect_sqlite::SqliteDialect;

#[path = "support/sqlite_fixture.rs"]
mod sqlite_fixture;

use sqlite_fixture::in_memory;

#[test]
fn capabilities_disable_row_locks_and_gin() {
    let capabilities = SqliteDialect.capabilities();

    assert!(!capabilities.supports_row_locks);
    assert!(!capabilities.supports_gin_indexes);
    assert_eq!(SqliteDialect.default_pool().max_open, 1);
    assert_eq!(SqliteDialect.no_case_collation(), "COLLATE NOCASE");
    assert_eq!(SqliteDialect.post_sync_optimization(), Some("PRAGMA optimize"));
}

#[test]
fn booleans_are_stored_as_integers() {
    assert_eq!(SqliteDialect.format_bool(true), RawValue::Integer(1));
    assert_eq!(SqliteDialect.format_bool(false), RawValue::Integer(0));
    assert!(SqliteDialect.bool_value(&RawValue::Integer(1)));
    assert!(!SqliteDialect.bool_value(&RawValue::Integer(0)));
    assert!(SqliteDialect.bool_value(&RawValue::Text("true".into())));
}

#[test]
fn time_codec_reads_iso_and_native_layouts() {
    let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
        + chrono::Duration::milliseconds(678);

    for raw in [
        "2024-01-02 03:04:05.678Z",
        "2024-01-02 03:04:05.678",
        "2024-01-02T03:04:05.678Z",
        "2024-01-02T05:04:05.678+02:00",
    ] {
        assert_eq!(SqliteDialect.time_value(raw).unwrap(), expected, "{raw}");
    }

    assert_eq!(
        SqliteDialect.format_time(&expected),
        "2024-01-02 03:04:05.678Z"
    );
    assert!(SqliteDialect.time_value("").is_err());
    assert!(SqliteDialect.time_value("02/01/2024").is_err());
}

#[test]
fn column_definitions_default_to_non_null_values() {
    assert_eq!(
        SqliteDialect.column_definition(ColumnKind::Text),
        "TEXT DEFAULT '' NOT NULL"
    );
    assert_eq!(
        SqliteDialect.column_definition(ColumnKind::JsonArray),
        "JSON DEFAULT '[]' NOT NULL"
    );
    assert!(
        SqliteDialect
            .column_definition(ColumnKind::PrimaryKey)
            .starts_with("TEXT PRIMARY KEY")
    );
}

#[test]
fn primary_key_default_generates_fifteen_character_ids() {
    let adapter = in_memory();
    adapter
        .execute(&format!(
            "CREATE TABLE items (id {}, title TEXT)",
            SqliteDialect.column_definition(ColumnKind::PrimaryKey)
        ))
        .expect("create table");
    adapter
        .execute("INSERT INTO items (title) VALUES ('a')")
        .expect("insert");

    let rows = adapter.query_text_rows("SELECT id FROM items").expect("select");
    let id = rows[0][0].clone().expect("generated id");
    assert_eq!(id.len(), 15);
    assert!(id.starts_with('r'));
}

#[test]
fn real_constraint_failures_are_classified() {
    let adapter = in_memory();
    adapter
        .execute(
            "CREATE TABLE users (id TEXT PRIMARY KEY, email TEXT UNIQUE);
             CREATE TABLE posts (id TEXT PRIMARY KEY, author TEXT REFERENCES users (id));
             INSERT INTO users VALUES ('u1', 'a@example.com');",
        )
        .expect("schema setup");

    let duplicate = adapter
        .execute("INSERT INTO users VALUES ('u2', 'a@example.com')")
        .expect_err("duplicate email");
    assert!(SqliteDialect.is_unique_violation(&duplicate));
    assert!(!SqliteDialect.is_foreign_key_violation(&duplicate));
    assert!(matches!(
        SqliteDialect.classify_violation(duplicate),
        Error::Constraint(violation) if violation.kind == ConstraintKind::Unique
    ));

    let duplicate_key = adapter
        .execute("INSERT INTO users VALUES ('u1', 'b@example.com')")
        .expect_err("duplicate primary key");
    assert!(SqliteDialect.is_unique_violation(&duplicate_key));

    let orphan = adapter
        .execute("INSERT INTO posts VALUES ('p1', 'nobody')")
        .expect_err("dangling reference");
    assert!(SqliteDialect.is_foreign_key_violation(&orphan));
    assert!(matches!(
        SqliteDialect.classify_violation(orphan),
        Error::Constraint(violation) if violation.kind == ConstraintKind::ForeignKey
    ));

    let syntax = adapter.execute("SELEC 1").expect_err("syntax error");
    assert!(matches!(
        SqliteDialect.classify_violation(syntax),
        Error::Execute(_)
    ));
}
