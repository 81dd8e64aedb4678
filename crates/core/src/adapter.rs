use std::collections::BTreeMap;

use crate::{Dialect, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfoRow {
    pub index: i64,
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDefinition {
    pub name: String,
    /// Complete `CREATE VIEW` statement that restores the view.
    pub create_sql: String,
}

pub type TransactionFn<'f> = dyn FnMut(&dyn SchemaExecutor) -> Result<()> + 'f;

/// Statement execution and catalog reads against either the pool or an open transaction.
///
/// Table-name lookups are case-insensitive. `table_info` is the only read that
/// fails for a missing table; the others report it as absent/empty.
pub trait SchemaExecutor {
    fn dialect(&self) -> &dyn Dialect;
    fn execute(&self, sql: &str) -> Result<()>;

    /// Every cell rendered as text; `None` for SQL NULL.
    fn query_text_rows(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>>;

    fn has_table(&self, name: &str) -> Result<bool>;
    fn table_columns(&self, name: &str) -> Result<Vec<String>>;
    fn table_info(&self, name: &str) -> Result<Vec<TableInfoRow>>;

    /// Index name to defining SQL, excluding engine-generated indexes.
    fn table_indexes(&self, name: &str) -> Result<BTreeMap<String, String>>;

    fn views(&self) -> Result<Vec<ViewDefinition>>;
    fn in_transaction(&self) -> bool;

    /// Opens a transaction, or joins the current one when already inside it.
    fn run_in_transaction(&self, f: &mut TransactionFn<'_>) -> Result<()>;
}

pub trait DatabaseAdapter: SchemaExecutor + Send + Sync {
    /// Reclaims storage or refreshes planner statistics; never inside a transaction.
    fn vacuum(&self) -> Result<()>;
}
