use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    Collection, GinReport, MigrationError, Result, SchemaExecutor, SyncPhase, ValidationError,
    cardinality::normalize_table_cardinality,
    gin::{ensure_gin_indexes, gin_candidate_fields, gin_index_name},
    index::parse_collection_indexes,
    sql::{
        add_column_sql, create_table_sql, drop_column_sql, drop_index_sql, rename_column_sql,
        rename_table_sql, temp_name,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncAction {
    /// Views have no record table to migrate.
    #[default]
    Skipped,
    Created,
    Updated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub action: SyncAction,
    pub indexes_rebuilt: bool,
    pub normalized_fields: usize,
    /// Index expressions that were skipped, keyed by their position in the collection.
    pub invalid_indexes: ValidationError,
    pub gin: GinReport,
}

/// Keeps a collection's record table in line with its field and index declarations.
pub struct SchemaSynchronizer<'a> {
    db: &'a dyn SchemaExecutor,
}

impl<'a> SchemaSynchronizer<'a> {
    #[must_use]
    pub fn new(db: &'a dyn SchemaExecutor) -> Self {
        Self { db }
    }

    /// Creates or migrates the record table of `new`; `old` is the previously saved definition.
    ///
    /// Every DDL/DML step runs in one transaction (joined when `db` is already
    /// inside one), so a failure leaves the table as it was.
    pub fn sync(&self, new: &Collection, old: Option<&Collection>) -> Result<SyncOutcome> {
        if new.is_view() {
            debug!(collection = %new.name, "skipping record table sync for view");
            return Ok(SyncOutcome::default());
        }

        let mut outcome = SyncOutcome::default();
        self.db.run_in_transaction(&mut |tx| {
            outcome = match old {
                Some(old) if !old.is_view() && tx.has_table(&old.name)? => {
                    update_table(tx, new, old)?
                }
                _ => create_table(tx, new)?,
            };
            Ok(())
        })?;

        self.run_post_sync_optimization();
        Ok(outcome)
    }

    fn run_post_sync_optimization(&self) {
        let Some(sql) = self.db.dialect().post_sync_optimization() else {
            return;
        };

        if self.db.in_transaction() {
            debug!(sql, "deferring post-sync optimization to the outer transaction owner");
            return;
        }

        if let Err(error) = self.db.execute(sql) {
            warn!(sql, %error, "post-sync optimization failed");
        }
    }
}

pub fn sync_record_table_schema(
    db: &dyn SchemaExecutor,
    new: &Collection,
    old: Option<&Collection>,
) -> Result<SyncOutcome> {
    SchemaSynchronizer::new(db).sync(new, old)
}

fn create_table(tx: &dyn SchemaExecutor, new: &Collection) -> Result<SyncOutcome> {
    let columns = new
        .fields
        .iter()
        .map(|field| (field.name.clone(), field.column_type(tx.dialect())))
        .collect::<Vec<_>>();
    run_step(
        tx,
        &new.name,
        SyncPhase::CreateTable,
        &create_table_sql(&new.name, &columns),
    )?;

    let mut outcome = SyncOutcome {
        action: SyncAction::Created,
        indexes_rebuilt: true,
        ..SyncOutcome::default()
    };
    create_indexes(tx, new, &new.name, &mut outcome)?;

    info!(table = %new.name, columns = columns.len(), "created record table");
    Ok(outcome)
}

fn update_table(tx: &dyn SchemaExecutor, new: &Collection, old: &Collection) -> Result<SyncOutcome> {
    let table_renamed = old.name != new.name;
    let table = &new.name;
    let needs_index_rebuild = table_renamed
        || serialized_differs(&old.fields, &new.fields)
        || serialized_differs(&old.indexes, &new.indexes);

    let mut outcome = SyncOutcome {
        action: SyncAction::Updated,
        indexes_rebuilt: needs_index_rebuild,
        ..SyncOutcome::default()
    };

    // indexes go first so renames and type changes never trip over them
    if needs_index_rebuild {
        let (old_indexes, _) = parse_collection_indexes(old);
        for index in &old_indexes {
            run_step(
                tx,
                table,
                SyncPhase::DropIndexes,
                &drop_index_sql(&index.index_name),
            )?;
        }
        for index_name in owned_gin_indexes(tx, old)? {
            run_step(tx, table, SyncPhase::DropIndexes, &drop_index_sql(&index_name))?;
        }
    }

    if table_renamed {
        rename_table(tx, &old.name, &new.name)?;
    }

    for old_field in &old.fields {
        if new.field_by_id(&old_field.id).is_none() {
            run_step(
                tx,
                table,
                SyncPhase::DropColumn,
                &drop_column_sql(table, &old_field.name),
            )?;
        }
    }

    // adds and renames land on temporary names first so swapped names never collide
    let mut taken = tx.table_columns(table)?;
    taken.extend(old.fields.iter().map(|field| field.name.clone()));
    taken.extend(new.fields.iter().map(|field| field.name.clone()));
    let mut pending_renames = Vec::new();

    for field in &new.fields {
        let old_field = old.field_by_id(&field.id);
        if old_field.is_some_and(|old_field| old_field.name == field.name) {
            continue;
        }

        let temp = temp_name("", &field.name, taken.iter().map(String::as_str));
        taken.push(temp.clone());

        match old_field {
            None => run_step(
                tx,
                table,
                SyncPhase::AddColumn,
                &add_column_sql(table, &temp, &field.column_type(tx.dialect())),
            )?,
            Some(old_field) => run_step(
                tx,
                table,
                SyncPhase::RenameColumn,
                &rename_column_sql(table, &old_field.name, &temp),
            )?,
        }
        pending_renames.push((temp, field.name.as_str()));
    }

    for (temp, name) in &pending_renames {
        run_step(
            tx,
            table,
            SyncPhase::FinalizeRename,
            &rename_column_sql(table, temp, name),
        )?;
    }

    outcome.normalized_fields = normalize_table_cardinality(tx, table, new, old)
        .map_err(|error| MigrationError::new(table, SyncPhase::NormalizeCardinality, error))?;

    if needs_index_rebuild {
        create_indexes(tx, new, table, &mut outcome)?;
    }

    info!(
        table = %table,
        renamed_from = %old.name,
        columns_changed = pending_renames.len(),
        indexes_rebuilt = needs_index_rebuild,
        "updated record table"
    );
    Ok(outcome)
}

/// Case-only renames hop through a temporary name; some engines treat the two names as one table.
fn rename_table(tx: &dyn SchemaExecutor, from: &str, to: &str) -> Result<()> {
    if !from.eq_ignore_ascii_case(to) {
        return run_step(tx, to, SyncPhase::RenameTable, &rename_table_sql(from, to));
    }

    let temp = temp_name("_", to, [from, to]);
    run_step(tx, to, SyncPhase::RenameTable, &rename_table_sql(from, &temp))?;
    run_step(tx, to, SyncPhase::RenameTable, &rename_table_sql(&temp, to))
}

/// Catalog GIN indexes named after `old`; they are recreated under the new names.
fn owned_gin_indexes(tx: &dyn SchemaExecutor, old: &Collection) -> Result<Vec<String>> {
    if !tx.dialect().capabilities().supports_gin_indexes {
        return Ok(Vec::new());
    }

    let owned = gin_candidate_fields(old)
        .into_iter()
        .map(|field| gin_index_name(old, field))
        .collect::<Vec<_>>();
    let existing = tx
        .table_indexes(&old.name)
        .map_err(|error| MigrationError::new(&old.name, SyncPhase::DropIndexes, error))?;

    Ok(owned
        .into_iter()
        .filter(|name| existing.contains_key(name))
        .collect())
}

fn create_indexes(
    tx: &dyn SchemaExecutor,
    collection: &Collection,
    table: &str,
    outcome: &mut SyncOutcome,
) -> Result<()> {
    let (indexes, invalid) = parse_collection_indexes(collection);
    if !invalid.is_empty() {
        warn!(collection = %collection.name, %invalid, "skipping invalid index expressions");
    }
    outcome.invalid_indexes = invalid;

    let supports_gin = tx.dialect().capabilities().supports_gin_indexes;
    for mut index in indexes {
        index.table_name = table.to_string();
        run_step(
            tx,
            table,
            SyncPhase::CreateIndexes,
            &index.render(supports_gin),
        )?;
    }

    outcome.gin = ensure_gin_indexes(tx, collection)
        .map_err(|error| MigrationError::new(table, SyncPhase::CreateIndexes, error))?;
    Ok(())
}

fn run_step(tx: &dyn SchemaExecutor, table: &str, phase: SyncPhase, sql: &str) -> Result<()> {
    debug!(table, %phase, sql, "record table sync step");
    tx.execute(sql)
        .map_err(|error| MigrationError::new(table, phase, error).into())
}

/// Plain string comparison of the serialized lists, not a semantic diff.
fn serialized_differs<T>(old: &T, new: &T) -> bool
where
    T: Serialize + PartialEq + ?Sized,
{
    match (serde_json::to_string(old), serde_json::to_string(new)) {
        (Ok(old), Ok(new)) => old != new,
        _ => old != new,
    }
}
