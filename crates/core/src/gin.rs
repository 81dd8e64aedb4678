use tracing::{debug, warn};

use crate::{
    Collection, Field, IndexColumn, IndexKind, ParsedIndex, Result, SchemaExecutor,
    index::parse_collection_indexes,
};

const GIN_SAVEPOINT: &str = "recordsync_gin_index";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GinReport {
    pub created: usize,
    pub failed: usize,
}

#[must_use]
pub fn gin_index_name(collection: &Collection, field: &Field) -> String {
    format!("idx_{}_{}_gin", collection.name, field.name)
}

/// Fields whose physical column is JSON and therefore wants an inverted index.
#[must_use]
pub fn gin_candidate_fields(collection: &Collection) -> Vec<&Field> {
    if collection.is_view() {
        return Vec::new();
    }

    collection
        .fields
        .iter()
        .filter(|field| field.stores_json())
        .collect()
}

/// `CREATE INDEX IF NOT EXISTS ... USING GIN` statements for JSON columns not yet covered.
///
/// Coverage is decided by column membership in any GIN index, whether declared
/// on the collection or already present in the catalog, never by index name.
pub fn missing_gin_indexes(db: &dyn SchemaExecutor, collection: &Collection) -> Result<Vec<String>> {
    Ok(missing_gin_fields(db, collection)?
        .into_iter()
        .map(|field| gin_index_statement(collection, field))
        .collect())
}

fn missing_gin_fields<'c>(
    db: &dyn SchemaExecutor,
    collection: &'c Collection,
) -> Result<Vec<&'c Field>> {
    if !db.dialect().capabilities().supports_gin_indexes {
        return Ok(Vec::new());
    }

    let candidates = gin_candidate_fields(collection);
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let (declared, _) = parse_collection_indexes(collection);
    let existing = db
        .table_indexes(&collection.name)?
        .into_values()
        .filter_map(|sql| ParsedIndex::parse(&sql))
        .collect::<Vec<_>>();
    let gin_indexes = declared
        .iter()
        .chain(&existing)
        .filter(|index| index.kind == IndexKind::Gin)
        .collect::<Vec<_>>();

    Ok(candidates
        .into_iter()
        .filter(|field| !gin_indexes.iter().any(|index| index.contains_column(&field.name)))
        .collect())
}

/// Creates every missing GIN index; failures are logged and skipped one by one.
///
/// An index only counts as created once the catalog lists it on the table:
/// `IF NOT EXISTS` turns into a no-op when another table already owns the name.
pub fn ensure_gin_indexes(db: &dyn SchemaExecutor, collection: &Collection) -> Result<GinReport> {
    let mut report = GinReport::default();

    for field in missing_gin_fields(db, collection)? {
        let index_name = gin_index_name(collection, field);
        let statement = gin_index_statement(collection, field);
        let outcome = match execute_isolated(db, &statement)? {
            Ok(()) if db.table_indexes(&collection.name)?.contains_key(&index_name) => Ok(()),
            Ok(()) => Err(format!("index name `{index_name}` is taken by another table")),
            Err(error) => Err(error.to_string()),
        };

        match outcome {
            Ok(()) => {
                debug!(collection = %collection.name, sql = %statement, "created gin index");
                report.created += 1;
            }
            Err(error) => {
                warn!(collection = %collection.name, sql = %statement, %error, "failed to create gin index");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

fn gin_index_statement(collection: &Collection, field: &Field) -> String {
    ParsedIndex {
        schema_name: None,
        index_name: gin_index_name(collection, field),
        table_name: collection.name.clone(),
        columns: vec![IndexColumn::named(field.name.clone())],
        unique: false,
        if_not_exists: true,
        partial_predicate: None,
        kind: IndexKind::Gin,
    }
    .build()
}

/// Outer error: the savepoint bookkeeping failed. Inner error: the statement itself failed.
fn execute_isolated(
    db: &dyn SchemaExecutor,
    statement: &str,
) -> Result<std::result::Result<(), crate::Error>> {
    if !db.in_transaction() {
        return Ok(db.execute(statement));
    }

    db.execute(&format!("SAVEPOINT {GIN_SAVEPOINT}"))?;
    let outcome = db.execute(statement);
    if outcome.is_err() {
        db.execute(&format!("ROLLBACK TO SAVEPOINT {GIN_SAVEPOINT}"))?;
    }
    db.execute(&format!("RELEASE SAVEPOINT {GIN_SAVEPOINT}"))?;

    Ok(outcome)
}
