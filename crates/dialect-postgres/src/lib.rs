mod adapter;
mod json;
mod queries;

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use recordsync_core::{
    Capabilities, ColumnKind, ConnectionConfig, DatabaseAdapter, Dialect, Error, JsonPredicates,
    PoolConfig, RawValue, Result, TimeLayout, parse_timestamp,
};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

const NATIVE_TIME_LAYOUTS: &[TimeLayout] = &[
    TimeLayout::Offset("%Y-%m-%d %H:%M:%S%.f%#z"),
    TimeLayout::Naive("%Y-%m-%d %H:%M:%S%.f"),
    TimeLayout::Naive("%Y-%m-%d %H:%M:%S"),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_row_locks: true,
            supports_gin_indexes: true,
        }
    }

    fn default_pool(&self) -> PoolConfig {
        PoolConfig {
            max_open: 25,
            max_idle: 5,
            conn_max_lifetime: Some(Duration::from_secs(5 * 60)),
            conn_max_idle_time: Some(Duration::from_secs(60)),
        }
    }

    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn DatabaseAdapter>> {
        adapter::connect(config)
    }

    fn column_definition(&self, kind: ColumnKind) -> String {
        match kind {
            ColumnKind::PrimaryKey => {
                "TEXT PRIMARY KEY DEFAULT ('r' || substr(md5(random()::text || clock_timestamp()::text), 1, 14)) NOT NULL"
            }
            ColumnKind::Text => "TEXT DEFAULT '' NOT NULL",
            ColumnKind::Number => "NUMERIC DEFAULT 0 NOT NULL",
            ColumnKind::Bool => "BOOLEAN DEFAULT FALSE NOT NULL",
            ColumnKind::Json => "JSONB DEFAULT NULL",
            ColumnKind::JsonArray => "JSONB DEFAULT '[]'::jsonb NOT NULL",
        }
        .to_string()
    }

    fn format_bool(&self, value: bool) -> RawValue {
        RawValue::Bool(value)
    }

    fn time_value(&self, raw: &str) -> Result<DateTime<Utc>> {
        parse_timestamp(raw, NATIVE_TIME_LAYOUTS)
    }

    fn format_time(&self, value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn json_predicates(&self) -> &'static dyn JsonPredicates {
        &json::POSTGRES_JSON
    }

    /// Postgres has no portable case-insensitive collation; callers wrap both sides in `LOWER`.
    fn no_case_collation(&self) -> &'static str {
        "LOWER"
    }

    fn is_unique_violation(&self, error: &Error) -> bool {
        error.execution().is_some_and(|error| {
            error.code() == Some(UNIQUE_VIOLATION)
                || error
                    .message()
                    .contains("duplicate key value violates unique constraint")
        })
    }

    fn is_foreign_key_violation(&self, error: &Error) -> bool {
        error.execution().is_some_and(|error| {
            error.code() == Some(FOREIGN_KEY_VIOLATION)
                || error.message().contains("violates foreign key constraint")
        })
    }
}
