use std::collections::BTreeMap;

use recordsync_core::{
    Collection, ConnectionConfig, DatabaseAdapter, Dialect, Error, Field, FieldKind,
    IntrospectionError, SyncAction, missing_gin_indexes, sync_record_table_schema,
};
use recordsync_dialect_postgres::PostgresDialect;
use recordsync_dialect_sqlite::SqliteDialect;

fn live_adapter() -> Option<Box<dyn DatabaseAdapter>> {
    if std::env::var("RECORDSYNC_POSTGRES_ENABLE_IGNORED").as_deref() != Ok("1") {
        return None;
    }

    let host =
        std::env::var("RECORDSYNC_POSTGRES_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("RECORDSYNC_POSTGRES_PORT")
        .ok()
        .and_then(|raw| raw.parse::<u16>().ok())
        .unwrap_or(5432);
    let user = std::env::var("RECORDSYNC_POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = std::env::var("RECORDSYNC_POSTGRES_PASSWORD").unwrap_or_default();
    let database =
        std::env::var("RECORDSYNC_POSTGRES_DATABASE").unwrap_or_else(|_| "postgres".to_string());

    let connection = ConnectionConfig {
        host: Some(host),
        port: Some(port),
        user: Some(user),
        password: Some(password),
        database,
        extra: BTreeMap::new(),
        ..ConnectionConfig::default()
    };

    Some(
        PostgresDialect
            .connect(&connection)
            .expect("connect should succeed for integration runtime"),
    )
}

fn articles(name: &str, tags_max_select: u32) -> Collection {
    Collection::new(name)
        .with_field(Field::primary_key("f0"))
        .with_field(Field::new("f1", "title", FieldKind::text()))
        .with_field(Field::new("f2", "metadata", FieldKind::Json))
        .with_field(Field::new(
            "f3",
            "tags",
            FieldKind::Select {
                values: vec!["rust".into(), "sql".into()],
                max_select: tags_max_select,
            },
        ))
        .with_index(format!("CREATE INDEX idx_{name}_title ON {name} (title)"))
}

fn fresh_table(adapter: &dyn DatabaseAdapter, name: &str) {
    adapter
        .execute(&format!("DROP TABLE IF EXISTS \"{name}\" CASCADE"))
        .expect("drop leftover table");
}

#[test]
#[ignore = "requires postgres container runtime"]
fn sync_creates_table_indexes_and_gin_coverage() {
    let Some(adapter) = live_adapter() else {
        return;
    };
    let table = format!("rs_live_create_{}", std::process::id());
    fresh_table(adapter.as_ref(), &table);
    let collection = articles(&table, 3);

    let outcome =
        sync_record_table_schema(adapter.as_ref(), &collection, None).expect("create table");

    assert_eq!(outcome.action, SyncAction::Created);
    assert_eq!(outcome.gin.created, 2);
    assert_eq!(
        adapter.table_columns(&table).expect("columns"),
        vec!["id", "title", "metadata", "tags"]
    );
    let indexes = adapter.table_indexes(&table).expect("indexes");
    assert!(indexes.contains_key(&format!("idx_{table}_title")));
    assert!(indexes.contains_key(&format!("idx_{table}_metadata_gin")));
    assert!(
        missing_gin_indexes(adapter.as_ref(), &collection)
            .expect("gin check")
            .is_empty()
    );

    let resynced = sync_record_table_schema(adapter.as_ref(), &collection, Some(&collection))
        .expect("resync");
    assert_eq!(resynced.gin.created, 0);

    fresh_table(adapter.as_ref(), &table);
}

#[test]
#[ignore = "requires postgres container runtime"]
fn cardinality_flips_rewrite_jsonb_values() {
    let Some(adapter) = live_adapter() else {
        return;
    };
    let table = format!("rs_live_flip_{}", std::process::id());
    fresh_table(adapter.as_ref(), &table);
    sync_record_table_schema(adapter.as_ref(), &articles(&table, 1), None).expect("create table");
    adapter
        .execute(&format!(
            "INSERT INTO \"{table}\" (id, title, tags) VALUES ('a', 'one', 'rust'), ('b', 'two', '')"
        ))
        .expect("seed rows");

    let outcome = sync_record_table_schema(
        adapter.as_ref(),
        &articles(&table, 2),
        Some(&articles(&table, 1)),
    )
    .expect("to multiple");
    assert_eq!(outcome.normalized_fields, 1);

    let rows = adapter
        .query_text_rows(&format!("SELECT id, tags::text FROM \"{table}\" ORDER BY id"))
        .expect("select");
    assert_eq!(
        rows,
        vec![
            vec![Some("a".to_string()), Some("[\"rust\"]".to_string())],
            vec![Some("b".to_string()), Some("[]".to_string())],
        ]
    );

    sync_record_table_schema(
        adapter.as_ref(),
        &articles(&table, 1),
        Some(&articles(&table, 2)),
    )
    .expect("back to single");
    let rows = adapter
        .query_text_rows(&format!("SELECT tags FROM \"{table}\" ORDER BY id"))
        .expect("select");
    assert_eq!(
        rows,
        vec![vec![Some("rust".to_string())], vec![Some(String::new())]]
    );

    adapter.vacuum().expect("analyze");
    fresh_table(adapter.as_ref(), &table);
}

fn column_shape(adapter: &dyn DatabaseAdapter, table: &str) -> Vec<(i64, String, bool, bool)> {
    adapter
        .table_info(table)
        .expect("table info")
        .into_iter()
        .map(|row| (row.index, row.name, row.not_null, row.primary_key))
        .collect()
}

fn text_rows(adapter: &dyn DatabaseAdapter, sql: &str) -> Vec<Vec<String>> {
    adapter
        .query_text_rows(sql)
        .expect("select")
        .into_iter()
        .map(|row| row.into_iter().map(Option::unwrap_or_default).collect())
        .collect()
}

#[test]
#[ignore = "requires postgres container runtime"]
fn introspection_matches_sqlite_for_the_same_collection() {
    let Some(adapter) = live_adapter() else {
        return;
    };
    let table = format!("rs_live_shape_{}", std::process::id());
    fresh_table(adapter.as_ref(), &table);
    let collection = articles(&table, 3);
    let sqlite = SqliteDialect
        .connect(&ConnectionConfig::for_database(":memory:"))
        .expect("in-memory sqlite should open");

    sync_record_table_schema(adapter.as_ref(), &collection, None).expect("postgres create");
    sync_record_table_schema(sqlite.as_ref(), &collection, None).expect("sqlite create");

    assert!(adapter.has_table(&table).expect("has table"));
    assert!(!adapter.has_table("rs_live_absent").expect("has table"));
    assert_eq!(
        column_shape(adapter.as_ref(), &table),
        column_shape(sqlite.as_ref(), &table)
    );
    let error = adapter
        .table_info("rs_live_absent")
        .expect_err("missing table");
    assert!(matches!(
        error,
        Error::Introspection(IntrospectionError::MissingTable { ref table }) if table == "rs_live_absent"
    ));

    fresh_table(adapter.as_ref(), &table);
}

#[test]
#[ignore = "requires postgres container runtime"]
fn swapping_field_names_keeps_each_value_with_its_field() {
    let Some(adapter) = live_adapter() else {
        return;
    };
    let table = format!("rs_live_swap_{}", std::process::id());
    fresh_table(adapter.as_ref(), &table);
    let old = Collection::new(&table)
        .with_field(Field::primary_key("f0"))
        .with_field(Field::new("f1", "name", FieldKind::text()))
        .with_field(Field::new("f2", "title", FieldKind::text()));
    let new = Collection::new(&table)
        .with_field(Field::primary_key("f0"))
        .with_field(Field::new("f1", "title", FieldKind::text()))
        .with_field(Field::new("f2", "name", FieldKind::text()));
    sync_record_table_schema(adapter.as_ref(), &old, None).expect("create table");
    adapter
        .execute(&format!(
            "INSERT INTO \"{table}\" (id, name, title) VALUES ('n1', 'was-name', 'was-title')"
        ))
        .expect("seed rows");

    sync_record_table_schema(adapter.as_ref(), &new, Some(&old)).expect("swap");

    assert_eq!(
        text_rows(
            adapter.as_ref(),
            &format!("SELECT title, name FROM \"{table}\"")
        ),
        vec![vec!["was-name", "was-title"]]
    );
    fresh_table(adapter.as_ref(), &table);
}

#[test]
#[ignore = "requires postgres container runtime"]
fn case_only_rename_keeps_the_table_syncable() {
    let Some(adapter) = live_adapter() else {
        return;
    };
    let table = format!("rs_live_case_{}", std::process::id());
    let renamed_table = format!("Rs_Live_Case_{}", std::process::id());
    fresh_table(adapter.as_ref(), &table);
    fresh_table(adapter.as_ref(), &renamed_table);
    sync_record_table_schema(adapter.as_ref(), &articles(&table, 1), None).expect("create table");
    adapter
        .execute(&format!(
            "INSERT INTO \"{table}\" (id, title, tags) VALUES ('a', 'one', 'rust')"
        ))
        .expect("seed rows");

    let renamed = articles(&renamed_table, 1);
    sync_record_table_schema(adapter.as_ref(), &renamed, Some(&articles(&table, 1)))
        .expect("case-only rename");
    let extended = renamed
        .clone()
        .with_field(Field::new("f4", "body", FieldKind::text()));
    sync_record_table_schema(adapter.as_ref(), &extended, Some(&renamed))
        .expect("sync after rename");

    assert_eq!(
        text_rows(
            adapter.as_ref(),
            &format!("SELECT id, title, body FROM \"{renamed_table}\"")
        ),
        vec![vec!["a", "one", ""]]
    );
    assert!(
        missing_gin_indexes(adapter.as_ref(), &extended)
            .expect("gin check")
            .is_empty()
    );
    fresh_table(adapter.as_ref(), &renamed_table);
}

#[test]
#[ignore = "requires postgres container runtime"]
fn renamed_table_releases_its_gin_index_names() {
    let Some(adapter) = live_adapter() else {
        return;
    };
    let original = format!("rs_live_gp_{}", std::process::id());
    let moved = format!("rs_live_ga_{}", std::process::id());
    fresh_table(adapter.as_ref(), &original);
    fresh_table(adapter.as_ref(), &moved);
    sync_record_table_schema(adapter.as_ref(), &articles(&original, 5), None)
        .expect("create table");

    let outcome = sync_record_table_schema(
        adapter.as_ref(),
        &articles(&moved, 5),
        Some(&articles(&original, 5)),
    )
    .expect("rename table");
    assert_eq!(outcome.gin.created, 2);
    assert!(
        adapter
            .table_indexes(&moved)
            .expect("indexes")
            .contains_key(&format!("idx_{moved}_tags_gin"))
    );

    let recreated = sync_record_table_schema(adapter.as_ref(), &articles(&original, 5), None)
        .expect("recreate original name");
    assert_eq!(recreated.gin.created, 2);
    assert_eq!(recreated.gin.failed, 0);
    assert!(
        missing_gin_indexes(adapter.as_ref(), &articles(&original, 5))
            .expect("gin check")
            .is_empty()
    );

    fresh_table(adapter.as_ref(), &original);
    fresh_table(adapter.as_ref(), &moved);
}
