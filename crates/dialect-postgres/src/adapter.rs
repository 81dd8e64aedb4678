use std::{cell::RefCell, collections::BTreeMap, time::Duration};

use postgres::{GenericClient, NoTls, Row, SimpleQueryMessage, types::FromSqlOwned};
use r2d2::{Builder, Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use recordsync_core::{
    ConnectionConfig, ConnectionError, DatabaseAdapter, Dialect, Error, ExecutionError,
    IntrospectionError, MaintenanceError, PoolConfig, Result, SchemaExecutor, TableInfoRow, TransactionFn,
    Version, ViewDefinition, sql::quote_ident,
};
use tracing::{debug, info, warn};

use crate::{PostgresDialect, queries};

const DIALECT_NAME: &str = "postgres";
const DEFAULT_POSTGRES_HOST: &str = "127.0.0.1";
const DEFAULT_APPLICATION_NAME: &str = "recordsync";
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MINIMUM_POSTGRES_MAJOR_VERSION: u16 = 16;
const SERVER_VERSION_OVERRIDE_KEY: &str = "postgres.server_version";

type ConnectionManager = PostgresConnectionManager<NoTls>;
type PooledClient = PooledConnection<ConnectionManager>;

pub(crate) struct PostgresAdapter {
    pool: Pool<ConnectionManager>,
}

pub(crate) fn connect(config: &ConnectionConfig) -> Result<Box<dyn DatabaseAdapter>> {
    let pool_config = config.resolved_pool(PostgresDialect.default_pool())?;

    if let Some(raw_version) = config.extra.get(SERVER_VERSION_OVERRIDE_KEY) {
        ensure_minimum_version(raw_version)?;
    }

    let connect_timeout = config
        .connect_timeout
        .filter(|timeout| !timeout.is_zero())
        .unwrap_or(DEFAULT_CONNECT_TIMEOUT);
    let manager = PostgresConnectionManager::new(client_config(config, connect_timeout), NoTls);
    let pool = pool_builder(&pool_config, connect_timeout)
        .build(manager)
        .map_err(|source| ConnectionError::unreachable(DIALECT_NAME, source))?;

    let mut client = pool
        .get()
        .map_err(|source| ConnectionError::unreachable(DIALECT_NAME, source))?;
    client
        .simple_query(queries::LIVENESS_QUERY)
        .map_err(|source| ConnectionError::unreachable(DIALECT_NAME, source))?;

    let server_version_raw = match config.extra.get(SERVER_VERSION_OVERRIDE_KEY) {
        Some(raw_version) => raw_version.clone(),
        None => client
            .query_one(queries::SERVER_VERSION_QUERY, &[])
            .and_then(|row| row.try_get::<_, String>(0_usize))
            .map_err(|source| ConnectionError::unreachable(DIALECT_NAME, source))?,
    };
    let server_version = ensure_minimum_version(&server_version_raw)?;
    drop(client);

    info!(
        database = %config.database,
        major = server_version.major,
        minor = server_version.minor,
        max_open = pool_config.max_open,
        "connected to postgres"
    );

    Ok(Box::new(PostgresAdapter { pool }))
}

// r2d2 has no idle cap: connections open on demand and `conn_max_idle_time` reaps them,
// so `max_idle` only bounds the config and is not handed to the pool.
fn pool_builder(pool_config: &PoolConfig, connect_timeout: Duration) -> Builder<ConnectionManager> {
    Pool::builder()
        .max_size(pool_config.max_open)
        .min_idle(Some(0))
        .max_lifetime(pool_config.conn_max_lifetime)
        .idle_timeout(pool_config.conn_max_idle_time)
        .connection_timeout(connect_timeout)
}

fn client_config(config: &ConnectionConfig, connect_timeout: Duration) -> postgres::Config {
    let mut postgres_config = postgres::Config::new();

    if let Some(socket_path) = &config.socket {
        postgres_config.host_path(socket_path);
    } else if let Some(host) = &config.host {
        postgres_config.host(host);
    } else {
        postgres_config.host(DEFAULT_POSTGRES_HOST);
    }

    if let Some(port) = config.port {
        postgres_config.port(port);
    }
    if let Some(user) = &config.user {
        postgres_config.user(user);
    }
    if let Some(password) = &config.password {
        postgres_config.password(password);
    }
    postgres_config.dbname(&config.database);
    postgres_config.application_name(
        config
            .application_name
            .as_deref()
            .unwrap_or(DEFAULT_APPLICATION_NAME),
    );
    postgres_config.options(&format!(
        "-c TimeZone={}",
        config.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE)
    ));
    postgres_config.connect_timeout(connect_timeout);

    postgres_config
}

impl PostgresAdapter {
    fn checkout(&self) -> Result<PooledClient> {
        self.pool
            .get()
            .map_err(|source| ConnectionError::unreachable(DIALECT_NAME, source).into())
    }
}

impl SchemaExecutor for PostgresAdapter {
    fn dialect(&self) -> &dyn Dialect {
        &PostgresDialect
    }

    fn execute(&self, sql: &str) -> Result<()> {
        execute_on(&mut *self.checkout()?, sql)
    }

    fn query_text_rows(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        query_text_rows_on(&mut *self.checkout()?, sql)
    }

    fn has_table(&self, name: &str) -> Result<bool> {
        has_table_on(&mut *self.checkout()?, name)
    }

    fn table_columns(&self, name: &str) -> Result<Vec<String>> {
        table_info_on(&mut *self.checkout()?, name)
            .map(|rows| rows.into_iter().map(|row| row.name).collect())
    }

    fn table_info(&self, name: &str) -> Result<Vec<TableInfoRow>> {
        require_columns(table_info_on(&mut *self.checkout()?, name)?, name)
    }

    fn table_indexes(&self, name: &str) -> Result<BTreeMap<String, String>> {
        table_indexes_on(&mut *self.checkout()?, name)
    }

    fn views(&self) -> Result<Vec<ViewDefinition>> {
        views_on(&mut *self.checkout()?)
    }

    fn in_transaction(&self) -> bool {
        false
    }

    fn run_in_transaction(&self, f: &mut TransactionFn<'_>) -> Result<()> {
        let mut client = self.checkout()?;
        let transaction = client
            .transaction()
            .map_err(|source| ExecutionError::transaction("begin", source))?;
        let session = PostgresSession {
            transaction: RefCell::new(transaction),
        };

        let result = f(&session);
        let transaction = session.transaction.into_inner();
        match result {
            Ok(()) => transaction
                .commit()
                .map_err(|source| ExecutionError::transaction("commit", source).into()),
            Err(error) => {
                if let Err(rollback_error) = transaction.rollback() {
                    warn!(%rollback_error, "postgres rollback failed");
                }
                Err(error)
            }
        }
    }
}

impl DatabaseAdapter for PostgresAdapter {
    fn vacuum(&self) -> Result<()> {
        self.execute(queries::ANALYZE_SQL).map_err(|source| {
            MaintenanceError::Failed {
                operation: queries::ANALYZE_SQL,
                source: Box::new(source),
            }
            .into()
        })
    }
}

/// One pooled connection pinned for the lifetime of an open transaction.
struct PostgresSession<'c> {
    transaction: RefCell<postgres::Transaction<'c>>,
}

impl SchemaExecutor for PostgresSession<'_> {
    fn dialect(&self) -> &dyn Dialect {
        &PostgresDialect
    }

    fn execute(&self, sql: &str) -> Result<()> {
        execute_on(&mut *self.transaction.borrow_mut(), sql)
    }

    fn query_text_rows(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        query_text_rows_on(&mut *self.transaction.borrow_mut(), sql)
    }

    fn has_table(&self, name: &str) -> Result<bool> {
        has_table_on(&mut *self.transaction.borrow_mut(), name)
    }

    fn table_columns(&self, name: &str) -> Result<Vec<String>> {
        table_info_on(&mut *self.transaction.borrow_mut(), name)
            .map(|rows| rows.into_iter().map(|row| row.name).collect())
    }

    fn table_info(&self, name: &str) -> Result<Vec<TableInfoRow>> {
        let rows = table_info_on(&mut *self.transaction.borrow_mut(), name)?;
        require_columns(rows, name)
    }

    fn table_indexes(&self, name: &str) -> Result<BTreeMap<String, String>> {
        table_indexes_on(&mut *self.transaction.borrow_mut(), name)
    }

    fn views(&self) -> Result<Vec<ViewDefinition>> {
        views_on(&mut *self.transaction.borrow_mut())
    }

    fn in_transaction(&self) -> bool {
        true
    }

    fn run_in_transaction(&self, f: &mut TransactionFn<'_>) -> Result<()> {
        f(self)
    }
}

fn execute_on(client: &mut impl GenericClient, sql: &str) -> Result<()> {
    debug!(sql, "postgres execute");
    client
        .batch_execute(sql)
        .map_err(|source| execution_error(sql, source))
}

fn query_text_rows_on(
    client: &mut impl GenericClient,
    sql: &str,
) -> Result<Vec<Vec<Option<String>>>> {
    let messages = client
        .simple_query(sql)
        .map_err(|source| execution_error(sql, source))?;

    Ok(messages
        .iter()
        .filter_map(|message| match message {
            SimpleQueryMessage::Row(row) => Some(
                (0..row.len())
                    .map(|index| row.get(index).map(str::to_string))
                    .collect(),
            ),
            _ => None,
        })
        .collect())
}

fn has_table_on(client: &mut impl GenericClient, name: &str) -> Result<bool> {
    let row = client
        .query_one(queries::HAS_TABLE_QUERY, &[&name])
        .map_err(|source| IntrospectionError::query_failed(name, source))?;
    row_value(&row, 0_usize, name)
}

fn table_info_on(client: &mut impl GenericClient, name: &str) -> Result<Vec<TableInfoRow>> {
    let rows = client
        .query(queries::TABLE_INFO_QUERY, &[&name])
        .map_err(|source| IntrospectionError::query_failed(name, source))?;

    rows.iter()
        .map(|row| {
            Ok(TableInfoRow {
                index: row_value(row, "position", name)?,
                name: row_value(row, "name", name)?,
                data_type: row_value(row, "data_type", name)?,
                not_null: row_value(row, "not_null", name)?,
                default_value: row_value(row, "default_value", name)?,
                primary_key: row_value(row, "primary_key", name)?,
            })
        })
        .collect()
}

fn table_indexes_on(
    client: &mut impl GenericClient,
    name: &str,
) -> Result<BTreeMap<String, String>> {
    let rows = client
        .query(queries::TABLE_INDEXES_QUERY, &[&name])
        .map_err(|source| IntrospectionError::query_failed(name, source))?;

    rows.iter()
        .map(|row| Ok((row_value(row, "index_name", name)?, row_value(row, "index_sql", name)?)))
        .collect()
}

fn views_on(client: &mut impl GenericClient) -> Result<Vec<ViewDefinition>> {
    const TARGET: &str = "pg_class";

    let rows = client
        .query(queries::VIEWS_QUERY, &[])
        .map_err(|source| IntrospectionError::query_failed(TARGET, source))?;

    rows.iter()
        .map(|row| {
            let name: String = row_value(row, "view_name", TARGET)?;
            let definition: String = row_value(row, "definition", TARGET)?;
            let create_sql = format!(
                "CREATE VIEW {} AS {}",
                quote_ident(&name),
                definition.trim().trim_end_matches(';')
            );
            Ok(ViewDefinition { name, create_sql })
        })
        .collect()
}

fn require_columns(rows: Vec<TableInfoRow>, name: &str) -> Result<Vec<TableInfoRow>> {
    if rows.is_empty() {
        return Err(IntrospectionError::MissingTable {
            table: name.to_string(),
        }
        .into());
    }
    Ok(rows)
}

fn row_value<I, T>(row: &Row, column: I, target: &str) -> Result<T>
where
    I: postgres::row::RowIndex + std::fmt::Display,
    T: FromSqlOwned,
{
    row.try_get(column)
        .map_err(|source| IntrospectionError::query_failed(target, source).into())
}

pub(crate) fn ensure_minimum_version(raw_version: &str) -> Result<Version> {
    let version = Version::parse(raw_version).ok_or_else(|| ConnectionError::InvalidVersion {
        dialect: DIALECT_NAME,
        raw: raw_version.to_string(),
    })?;

    if version.at_least(MINIMUM_POSTGRES_MAJOR_VERSION, 0) {
        return Ok(version);
    }

    Err(ConnectionError::UnsupportedVersion {
        dialect: DIALECT_NAME,
        raw: raw_version.to_string(),
        minimum: MINIMUM_POSTGRES_MAJOR_VERSION.to_string(),
    }
    .into())
}

fn execution_error(sql: &str, source: postgres::Error) -> Error {
    let code = source.code().map(|state| state.code().to_string());
    ExecutionError::statement_failed(sql, code, source).into()
}

#[cfg(test)]
mod tests {
    use recordsync_core::{ConnectionConfig, Dialect};

    use super::{DEFAULT_CONNECT_TIMEOUT, client_config, pool_builder};
    use crate::PostgresDialect;

    #[test]
    fn pool_opens_connections_on_demand_only() {
        let pool_config = PostgresDialect.default_pool();
        let manager = r2d2_postgres::PostgresConnectionManager::new(
            client_config(
                &ConnectionConfig::for_database("recordsync"),
                DEFAULT_CONNECT_TIMEOUT,
            ),
            postgres::NoTls,
        );

        let pool = pool_builder(&pool_config, DEFAULT_CONNECT_TIMEOUT).build_unchecked(manager);

        assert_eq!(pool.max_size(), 25);
        assert_eq!(pool.min_idle(), Some(0));
        assert_eq!(pool.state().connections, 0);
    }
}
