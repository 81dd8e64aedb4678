mod adapter;
mod json;
mod queries;

use chrono::{DateTime, Utc};
use recordsync_core::{
    Capabilities, ColumnKind, ConnectionConfig, DatabaseAdapter, Dialect, Error, JsonPredicates,
    PoolConfig, RawValue, Result, TimeLayout, parse_timestamp,
};

// https://www.sqlite.org/rescode.html#constraint_unique and #constraint_primarykey
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";
const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";

const NATIVE_TIME_LAYOUTS: &[TimeLayout] = &[
    TimeLayout::Naive("%Y-%m-%d %H:%M:%S%.fZ"),
    TimeLayout::Naive("%Y-%m-%d %H:%M:%S%.f"),
    TimeLayout::Naive("%Y-%m-%d %H:%M:%S"),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_row_locks: false,
            supports_gin_indexes: false,
        }
    }

    fn default_pool(&self) -> PoolConfig {
        PoolConfig {
            max_open: 1,
            max_idle: 1,
            conn_max_lifetime: None,
            conn_max_idle_time: None,
        }
    }

    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn DatabaseAdapter>> {
        adapter::connect(config)
    }

    fn column_definition(&self, kind: ColumnKind) -> String {
        match kind {
            ColumnKind::PrimaryKey => {
                "TEXT PRIMARY KEY DEFAULT ('r'||lower(hex(randomblob(7)))) NOT NULL"
            }
            ColumnKind::Text => "TEXT DEFAULT '' NOT NULL",
            ColumnKind::Number => "NUMERIC DEFAULT 0 NOT NULL",
            ColumnKind::Bool => "BOOLEAN DEFAULT FALSE NOT NULL",
            ColumnKind::Json => "JSON DEFAULT NULL",
            ColumnKind::JsonArray => "JSON DEFAULT '[]' NOT NULL",
        }
        .to_string()
    }

    fn format_bool(&self, value: bool) -> RawValue {
        RawValue::Integer(i64::from(value))
    }

    fn time_value(&self, raw: &str) -> Result<DateTime<Utc>> {
        parse_timestamp(raw, NATIVE_TIME_LAYOUTS)
    }

    fn format_time(&self, value: &DateTime<Utc>) -> String {
        value.format("%Y-%m-%d %H:%M:%S%.3fZ").to_string()
    }

    fn json_predicates(&self) -> &'static dyn JsonPredicates {
        &json::SQLITE_JSON
    }

    fn no_case_collation(&self) -> &'static str {
        "COLLATE NOCASE"
    }

    fn is_unique_violation(&self, error: &Error) -> bool {
        error.execution().is_some_and(|error| {
            matches!(
                error.code(),
                Some(SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY)
            ) || error.message().contains("UNIQUE constraint failed")
        })
    }

    fn is_foreign_key_violation(&self, error: &Error) -> bool {
        error.execution().is_some_and(|error| {
            error.code() == Some(SQLITE_CONSTRAINT_FOREIGNKEY)
                || error.message().contains("FOREIGN KEY constraint failed")
        })
    }

    fn post_sync_optimization(&self) -> Option<&'static str> {
        Some(queries::OPTIMIZE_SQL)
    }
}
