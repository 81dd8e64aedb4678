use recordsync_core::{ConnectionConfig, DatabaseAdapter, Dialect};
use recordsync_dialect_sqlite::SqliteDialect;

pub fn in_memory() -> Box<dyn DatabaseAdapter> {
    SqliteDialect
        .connect(&ConnectionConfig::for_database(":memory:"))
        .expect("in-memory sqlite should open")
}

#[allow(dead_code)]
pub fn rows(adapter: &dyn DatabaseAdapter, sql: &str) -> Vec<Vec<String>> {
    adapter
        .query_text_rows(sql)
        .expect("query should succeed")
        .into_iter()
        .map(|row| row.into_iter().map(Option::unwrap_or_default).collect())
        .collect()
}
