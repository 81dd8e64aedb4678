use std::{cell::RefCell, collections::BTreeMap, error::Error as StdError, fmt};

use chrono::{DateTime, SecondsFormat, Utc};
use recordsync_core::{
    Capabilities, ColumnKind, ConnectionConfig, ConnectionError, DatabaseAdapter, Dialect, Error,
    ExecutionError, IntrospectionError, JsonPredicates, ParsedIndex, PoolConfig, RawValue, Result,
    SchemaExecutor, TableInfoRow, TransactionFn, ViewDefinition, parse_timestamp,
};

pub const BEGIN_SQL: &str = "BEGIN";
pub const COMMIT_SQL: &str = "COMMIT";
pub const ROLLBACK_SQL: &str = "ROLLBACK";
pub const OPTIMIZE_SQL: &str = "PRAGMA optimize";

#[derive(Debug, Clone, Copy, Default)]
pub struct FakeDialect {
    pub supports_gin_indexes: bool,
    pub supports_row_locks: bool,
    pub optimize_after_sync: bool,
}

struct FakeJson;

static FAKE_JSON: FakeJson = FakeJson;

impl JsonPredicates for FakeJson {
    fn is_valid_json(&self, text_expr: &str) -> String {
        format!("json_valid({text_expr})")
    }

    fn type_of(&self, text_expr: &str) -> String {
        format!("json_type({text_expr})")
    }

    fn build_singleton_array(&self, expr: &str) -> String {
        format!("json_array({expr})")
    }

    fn last_element(&self, text_expr: &str) -> String {
        format!("json_extract({text_expr}, '$[#-1]')")
    }

    fn to_json(&self, text_expr: &str) -> String {
        text_expr.to_string()
    }

    fn to_text(&self, expr: &str) -> String {
        expr.to_string()
    }

    fn empty_array(&self) -> &'static str {
        "'[]'"
    }
}

impl Dialect for FakeDialect {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_row_locks: self.supports_row_locks,
            supports_gin_indexes: self.supports_gin_indexes,
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

    fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn DatabaseAdapter>> {
        Err(ConnectionError::invalid_config("fake dialect cannot connect").into())
    }

    fn column_definition(&self, kind: ColumnKind) -> String {
        match kind {
            ColumnKind::PrimaryKey => "TEXT PRIMARY KEY NOT NULL",
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
        parse_timestamp(raw, &[])
    }

    fn format_time(&self, value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn json_predicates(&self) -> &'static dyn JsonPredicates {
        &FAKE_JSON
    }

    fn no_case_collation(&self) -> &'static str {
        "COLLATE NOCASE"
    }

    fn is_unique_violation(&self, error: &Error) -> bool {
        error
            .execution()
            .is_some_and(|error| error.code() == Some("unique"))
    }

    fn is_foreign_key_violation(&self, error: &Error) -> bool {
        error
            .execution()
            .is_some_and(|error| error.code() == Some("foreign_key"))
    }

    fn post_sync_optimization(&self) -> Option<&'static str> {
        self.optimize_after_sync.then_some(OPTIMIZE_SQL)
    }
}

#[derive(Debug, Default)]
struct FakeTable {
    columns: Vec<String>,
    indexes: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct FakeState {
    tables: BTreeMap<String, FakeTable>,
    views: Vec<ViewDefinition>,
    executed_sql: Vec<String>,
    in_transaction: bool,
    fail_on: Option<(String, Option<String>)>,
}

impl FakeState {
    fn apply_catalog_change(&mut self, sql: &str) {
        let names = quoted_names(sql);
        if sql.starts_with("CREATE TABLE ") {
            if let Some(name) = names.first() {
                self.tables.entry(name.to_ascii_lowercase()).or_default();
            }
        } else if sql.starts_with("ALTER TABLE ") && sql.contains(" RENAME TO ") {
            if let [from, to, ..] = names.as_slice()
                && let Some(table) = self.tables.remove(&from.to_ascii_lowercase())
            {
                self.tables.insert(to.to_ascii_lowercase(), table);
            }
        } else if sql.starts_with("DROP INDEX ") {
            if let Some(name) = names.first() {
                for table in self.tables.values_mut() {
                    table.indexes.remove(name);
                }
            }
        } else if let Some(index) = ParsedIndex::parse(sql) {
            // index names share one namespace across tables
            let taken = self
                .tables
                .values()
                .any(|table| table.indexes.contains_key(&index.index_name));
            if let Some(table) = self.tables.get_mut(&index.table_name.to_ascii_lowercase())
                && !taken
            {
                table.indexes.insert(index.index_name, sql.to_string());
            }
        }
    }
}

fn quoted_names(sql: &str) -> Vec<String> {
    sql.split('"')
        .skip(1)
        .step_by(2)
        .map(ToString::to_string)
        .collect()
}

/// Records statements instead of running them. The catalog is whatever the test
/// seeds, kept in step with table creates, table renames and index DDL.
pub struct FakeExecutor {
    dialect: FakeDialect,
    state: RefCell<FakeState>,
}

#[allow(dead_code)]
impl FakeExecutor {
    pub fn new(dialect: FakeDialect) -> Self {
        Self {
            dialect,
            state: RefCell::new(FakeState::default()),
        }
    }

    pub fn with_table(self, name: &str, columns: &[&str]) -> Self {
        self.state.borrow_mut().tables.insert(
            name.to_ascii_lowercase(),
            FakeTable {
                columns: columns.iter().map(ToString::to_string).collect(),
                indexes: BTreeMap::new(),
            },
        );
        self
    }

    pub fn with_index(self, table: &str, name: &str, sql: &str) -> Self {
        if let Some(table) = self
            .state
            .borrow_mut()
            .tables
            .get_mut(&table.to_ascii_lowercase())
        {
            table.indexes.insert(name.to_string(), sql.to_string());
        }
        self
    }

    pub fn with_view(self, name: &str, create_sql: &str) -> Self {
        self.state.borrow_mut().views.push(ViewDefinition {
            name: name.to_string(),
            create_sql: create_sql.to_string(),
        });
        self
    }

    /// Every statement containing `fragment` fails, carrying `code` as its driver code.
    pub fn fail_on(&self, fragment: &str, code: Option<&str>) {
        self.state.borrow_mut().fail_on =
            Some((fragment.to_string(), code.map(ToString::to_string)));
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.state.borrow().executed_sql.clone()
    }

    pub fn clear_executed(&self) {
        self.state.borrow_mut().executed_sql.clear();
    }
}

impl SchemaExecutor for FakeExecutor {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn execute(&self, sql: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.executed_sql.push(sql.to_string());

        if let Some((fragment, code)) = &state.fail_on
            && sql.contains(fragment.as_str())
        {
            return Err(ExecutionError::statement_failed(
                sql,
                code.clone(),
                FakeDriverError(format!("statement rejected: {fragment}")),
            )
            .into());
        }

        state.apply_catalog_change(sql);
        Ok(())
    }

    fn query_text_rows(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        self.execute(sql)?;
        Ok(Vec::new())
    }

    fn has_table(&self, name: &str) -> Result<bool> {
        Ok(self
            .state
            .borrow()
            .tables
            .contains_key(&name.to_ascii_lowercase()))
    }

    fn table_columns(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .borrow()
            .tables
            .get(&name.to_ascii_lowercase())
            .map(|table| table.columns.clone())
            .unwrap_or_default())
    }

    fn table_info(&self, name: &str) -> Result<Vec<TableInfoRow>> {
        let state = self.state.borrow();
        let Some(table) = state.tables.get(&name.to_ascii_lowercase()) else {
            return Err(IntrospectionError::MissingTable {
                table: name.to_string(),
            }
            .into());
        };

        Ok(table
            .columns
            .iter()
            .enumerate()
            .map(|(index, column)| TableInfoRow {
                index: i64::try_from(index).unwrap_or(i64::MAX),
                name: column.clone(),
                data_type: "TEXT".to_string(),
                not_null: true,
                default_value: None,
                primary_key: column == "id",
            })
            .collect())
    }

    fn table_indexes(&self, name: &str) -> Result<BTreeMap<String, String>> {
        Ok(self
            .state
            .borrow()
            .tables
            .get(&name.to_ascii_lowercase())
            .map(|table| table.indexes.clone())
            .unwrap_or_default())
    }

    fn views(&self) -> Result<Vec<ViewDefinition>> {
        Ok(self.state.borrow().views.clone())
    }

    fn in_transaction(&self) -> bool {
        self.state.borrow().in_transaction
    }

    fn run_in_transaction(&self, f: &mut TransactionFn<'_>) -> Result<()> {
        if self.in_transaction() {
            return f(self);
        }

        {
            let mut state = self.state.borrow_mut();
            state.executed_sql.push(BEGIN_SQL.to_string());
            state.in_transaction = true;
        }

        let result = f(self);

        let mut state = self.state.borrow_mut();
        state.in_transaction = false;
        state.executed_sql.push(
            if result.is_ok() {
                COMMIT_SQL
            } else {
                ROLLBACK_SQL
            }
            .to_string(),
        );
        result
    }
}

#[derive(Debug)]
pub struct FakeDriverError(String);

impl fmt::Display for FakeDriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for FakeDriverError {}
