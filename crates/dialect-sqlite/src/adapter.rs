use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use rusqlite::{Connection, OptionalExtension, params, types::ValueRef};
use recordsync_core::{
    ConnectionConfig, ConnectionError, DatabaseAdapter, Dialect, ExecutionError,
    IntrospectionError, MaintenanceError, Result, SchemaExecutor, TableInfoRow, TransactionFn,
    Version, ViewDefinition,
};
use tracing::{debug, info, warn};

use crate::{SqliteDialect, queries};

const DIALECT_NAME: &str = "sqlite";
const MINIMUM_SQLITE_MAJOR_VERSION: u16 = 3;
const MINIMUM_SQLITE_MINOR_VERSION: u16 = 35;
const SERVER_VERSION_OVERRIDE_KEY: &str = "sqlite.server_version";
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(10);
const JOURNAL_SIZE_LIMIT: i64 = 200_000_000;
const CACHE_SIZE_KIB: i64 = -16_000;

pub(crate) struct SqliteAdapter {
    connection: Mutex<Connection>,
}

pub(crate) fn connect(config: &ConnectionConfig) -> Result<Box<dyn DatabaseAdapter>> {
    let pool = config.resolved_pool(SqliteDialect.default_pool())?;
    if pool.max_open > 1 {
        warn!(
            requested = pool.max_open,
            "sqlite allows a single writer; clamping the pool to one connection"
        );
    }

    if let Some(raw_version) = config.extra.get(SERVER_VERSION_OVERRIDE_KEY) {
        ensure_minimum_version(raw_version)?;
    }

    let connection = Connection::open(config.database.as_str())
        .map_err(|source| ConnectionError::unreachable(DIALECT_NAME, source))?;
    apply_pragmas(
        &connection,
        config.connect_timeout.unwrap_or(DEFAULT_BUSY_TIMEOUT),
    )?;

    connection
        .query_row(queries::LIVENESS_QUERY, [], |row| row.get::<_, i64>(0))
        .map_err(|source| ConnectionError::unreachable(DIALECT_NAME, source))?;

    let server_version_raw = match config.extra.get(SERVER_VERSION_OVERRIDE_KEY) {
        Some(raw_version) => raw_version.clone(),
        None => query_server_version(&connection)?,
    };
    let server_version = ensure_minimum_version(&server_version_raw)?;

    info!(
        database = %config.database,
        major = server_version.major,
        minor = server_version.minor,
        "opened sqlite database"
    );

    Ok(Box::new(SqliteAdapter {
        connection: Mutex::new(connection),
    }))
}

fn apply_pragmas(connection: &Connection, busy_timeout: Duration) -> Result<()> {
    let pragma_error = |source: rusqlite::Error| ConnectionError::unreachable(DIALECT_NAME, source);

    connection.busy_timeout(busy_timeout).map_err(pragma_error)?;
    let journal_mode = connection
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        .map_err(pragma_error)?;
    connection
        .pragma_update(None, "journal_size_limit", JOURNAL_SIZE_LIMIT)
        .map_err(pragma_error)?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .map_err(pragma_error)?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .map_err(pragma_error)?;
    connection
        .pragma_update(None, "temp_store", "MEMORY")
        .map_err(pragma_error)?;
    connection
        .pragma_update(None, "cache_size", CACHE_SIZE_KIB)
        .map_err(pragma_error)?;

    // in-memory databases keep their "memory" journal
    debug!(%journal_mode, ?busy_timeout, "applied sqlite connection pragmas");
    Ok(())
}

impl SqliteAdapter {
    fn lock_connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection.lock().map_err(|_| {
            ConnectionError::Poisoned {
                dialect: DIALECT_NAME,
            }
            .into()
        })
    }

    fn with_session<T>(&self, f: impl FnOnce(&SqliteSession<'_>) -> Result<T>) -> Result<T> {
        let connection = self.lock_connection()?;
        f(&SqliteSession {
            connection: &connection,
        })
    }
}

impl SchemaExecutor for SqliteAdapter {
    fn dialect(&self) -> &dyn Dialect {
        &SqliteDialect
    }

    fn execute(&self, sql: &str) -> Result<()> {
        self.with_session(|session| session.execute(sql))
    }

    fn query_text_rows(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        self.with_session(|session| session.query_text_rows(sql))
    }

    fn has_table(&self, name: &str) -> Result<bool> {
        self.with_session(|session| session.has_table(name))
    }

    fn table_columns(&self, name: &str) -> Result<Vec<String>> {
        self.with_session(|session| session.table_columns(name))
    }

    fn table_info(&self, name: &str) -> Result<Vec<TableInfoRow>> {
        self.with_session(|session| session.table_info(name))
    }

    fn table_indexes(&self, name: &str) -> Result<BTreeMap<String, String>> {
        self.with_session(|session| session.table_indexes(name))
    }

    fn views(&self) -> Result<Vec<ViewDefinition>> {
        self.with_session(|session| session.views())
    }

    fn in_transaction(&self) -> bool {
        self.lock_connection()
            .is_ok_and(|connection| !connection.is_autocommit())
    }

    fn run_in_transaction(&self, f: &mut TransactionFn<'_>) -> Result<()> {
        self.with_session(|session| session.run_in_transaction(f))
    }
}

impl DatabaseAdapter for SqliteAdapter {
    fn vacuum(&self) -> Result<()> {
        self.with_session(|session| {
            if session.in_transaction() {
                return Err(MaintenanceError::InsideTransaction {
                    operation: queries::VACUUM_SQL,
                }
                .into());
            }

            session.execute(queries::VACUUM_SQL).map_err(|source| {
                MaintenanceError::Failed {
                    operation: queries::VACUUM_SQL,
                    source: Box::new(source),
                }
                .into()
            })
        })
    }
}

/// A locked connection, either in autocommit mode or inside an open transaction.
struct SqliteSession<'c> {
    connection: &'c Connection,
}

impl SchemaExecutor for SqliteSession<'_> {
    fn dialect(&self) -> &dyn Dialect {
        &SqliteDialect
    }

    fn execute(&self, sql: &str) -> Result<()> {
        debug!(sql, "sqlite execute");
        self.connection
            .execute_batch(sql)
            .map_err(|source| execution_error(sql, source))
    }

    fn query_text_rows(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        let mut statement = self
            .connection
            .prepare(sql)
            .map_err(|source| execution_error(sql, source))?;
        let column_count = statement.column_count();
        let mut rows = statement
            .query([])
            .map_err(|source| execution_error(sql, source))?;

        let mut values = Vec::new();
        while let Some(row) = rows.next().map_err(|source| execution_error(sql, source))? {
            let mut cells = Vec::with_capacity(column_count);
            for index in 0..column_count {
                let cell = row
                    .get_ref(index)
                    .map_err(|source| execution_error(sql, source))?;
                cells.push(value_as_text(cell));
            }
            values.push(cells);
        }

        Ok(values)
    }

    fn has_table(&self, name: &str) -> Result<bool> {
        self.connection
            .query_row(queries::HAS_TABLE_QUERY, params![name], |row| {
                row.get::<_, i64>(0)
            })
            .map(|count| count > 0)
            .map_err(|source| IntrospectionError::query_failed(name, source).into())
    }

    fn table_columns(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .read_table_info(name)?
            .into_iter()
            .map(|row| row.name)
            .collect())
    }

    fn table_info(&self, name: &str) -> Result<Vec<TableInfoRow>> {
        let rows = self.read_table_info(name)?;
        if rows.is_empty() {
            return Err(IntrospectionError::MissingTable {
                table: name.to_string(),
            }
            .into());
        }
        Ok(rows)
    }

    fn table_indexes(&self, name: &str) -> Result<BTreeMap<String, String>> {
        self.query_pairs(queries::TABLE_INDEXES_QUERY, Some(name), name)
            .map(|pairs| pairs.into_iter().collect())
    }

    fn views(&self) -> Result<Vec<ViewDefinition>> {
        Ok(self
            .query_pairs(queries::VIEWS_QUERY, None, "sqlite_master")?
            .into_iter()
            .map(|(name, create_sql)| ViewDefinition { name, create_sql })
            .collect())
    }

    fn in_transaction(&self) -> bool {
        !self.connection.is_autocommit()
    }

    fn run_in_transaction(&self, f: &mut TransactionFn<'_>) -> Result<()> {
        if self.in_transaction() {
            return f(self);
        }

        let transaction = self
            .connection
            .unchecked_transaction()
            .map_err(|source| ExecutionError::transaction("begin", source))?;
        let result = f(&SqliteSession {
            connection: &transaction,
        });

        match result {
            Ok(()) => transaction
                .commit()
                .map_err(|source| ExecutionError::transaction("commit", source).into()),
            Err(error) => {
                if let Err(rollback_error) = transaction.rollback() {
                    warn!(%rollback_error, "sqlite rollback failed");
                }
                Err(error)
            }
        }
    }
}

impl SqliteSession<'_> {
    fn read_table_info(&self, name: &str) -> Result<Vec<TableInfoRow>> {
        let introspection_error =
            |source: rusqlite::Error| IntrospectionError::query_failed(name, source);

        let mut statement = self
            .connection
            .prepare(queries::TABLE_INFO_QUERY)
            .map_err(introspection_error)?;
        let rows = statement
            .query_map(params![name], |row| {
                Ok(TableInfoRow {
                    index: row.get(0)?,
                    name: row.get(1)?,
                    data_type: row.get(2)?,
                    not_null: row.get::<_, i64>(3)? != 0,
                    default_value: row.get(4)?,
                    primary_key: row.get::<_, i64>(5)? != 0,
                })
            })
            .map_err(introspection_error)?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|source| IntrospectionError::query_failed(name, source).into())
    }

    fn query_pairs(
        &self,
        query: &str,
        table: Option<&str>,
        target: &str,
    ) -> Result<Vec<(String, String)>> {
        let introspection_error =
            |source: rusqlite::Error| IntrospectionError::query_failed(target, source);

        let mut statement = self
            .connection
            .prepare(query)
            .map_err(introspection_error)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, String)> {
            Ok((row.get(0)?, row.get(1)?))
        };
        let rows = match table {
            Some(table) => statement.query_map(params![table], map_row),
            None => statement.query_map([], map_row),
        }
        .map_err(introspection_error)?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|source| IntrospectionError::query_failed(target, source).into())
    }
}

fn value_as_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(value) => Some(value.to_string()),
        ValueRef::Real(value) => Some(value.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn query_server_version(connection: &Connection) -> Result<String> {
    connection
        .query_row(queries::SERVER_VERSION_QUERY, [], |row| row.get(0))
        .optional()
        .map_err(|source| ConnectionError::unreachable(DIALECT_NAME, source))?
        .ok_or_else(|| {
            ConnectionError::InvalidVersion {
                dialect: DIALECT_NAME,
                raw: String::new(),
            }
            .into()
        })
}

pub(crate) fn ensure_minimum_version(raw_version: &str) -> Result<Version> {
    let version = Version::parse(raw_version).ok_or_else(|| ConnectionError::InvalidVersion {
        dialect: DIALECT_NAME,
        raw: raw_version.to_string(),
    })?;

    if version.at_least(MINIMUM_SQLITE_MAJOR_VERSION, MINIMUM_SQLITE_MINOR_VERSION) {
        return Ok(version);
    }

    Err(ConnectionError::UnsupportedVersion {
        dialect: DIALECT_NAME,
        raw: raw_version.to_string(),
        minimum: format!("{MINIMUM_SQLITE_MAJOR_VERSION}.{MINIMUM_SQLITE_MINOR_VERSION}"),
    }
    .into())
}

pub(crate) fn execution_error(sql: &str, source: rusqlite::Error) -> recordsync_core::Error {
    let code = match &source {
        rusqlite::Error::SqliteFailure(error, _) => Some(error.extended_code.to_string()),
        _ => None,
    };
    ExecutionError::statement_failed(sql, code, source).into()
}
