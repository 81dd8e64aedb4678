use tracing::{debug, info};

use crate::{
    Collection, Field, JsonPredicates, Result, SchemaExecutor,
    sql::{add_column_sql, drop_column_sql, drop_view_sql, quote_ident, rename_column_sql, temp_name},
    view_order::plan_view_order,
};

const TEMP_COLUMN_PREFIX: &str = "_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardinalityChange {
    SingleToMultiple,
    MultipleToSingle,
}

impl CardinalityChange {
    /// `None` when there is no old field or the multiplicity is unchanged.
    #[must_use]
    pub fn between(old: Option<&Field>, new: &Field) -> Option<Self> {
        let old = old?;
        match (old.is_multiple(), new.is_multiple()) {
            (false, true) => Some(Self::SingleToMultiple),
            (true, false) => Some(Self::MultipleToSingle),
            _ => None,
        }
    }
}

/// Re-encodes every column whose field flipped between single and multiple values.
///
/// Runs inside the caller's transaction when one is open. Views are exempt.
/// Returns the number of normalized fields.
pub fn normalize_cardinality_changes(
    db: &dyn SchemaExecutor,
    new: &Collection,
    old: &Collection,
) -> Result<usize> {
    normalize_table_cardinality(db, &new.name, new, old)
}

pub(crate) fn normalize_table_cardinality(
    db: &dyn SchemaExecutor,
    table: &str,
    new: &Collection,
    old: &Collection,
) -> Result<usize> {
    if new.is_view() {
        return Ok(0);
    }

    let changes = new
        .fields
        .iter()
        .filter_map(|field| {
            CardinalityChange::between(old.field_by_id(&field.id), field)
                .map(|change| (field, change))
        })
        .collect::<Vec<_>>();
    if changes.is_empty() {
        return Ok(0);
    }

    db.run_in_transaction(&mut |tx| {
        for (field, change) in &changes {
            normalize_field(tx, table, field, *change)?;
        }
        Ok(())
    })?;

    Ok(changes.len())
}

fn normalize_field(
    tx: &dyn SchemaExecutor,
    table: &str,
    field: &Field,
    change: CardinalityChange,
) -> Result<()> {
    // views over the table block the column rename/drop below
    let views = tx.views()?;
    let order = plan_view_order(&views);
    for view in &order.drop_order {
        tx.execute(&drop_view_sql(&view.name))?;
    }

    let columns = tx.table_columns(table)?;
    let temp_column = temp_name(
        TEMP_COLUMN_PREFIX,
        &field.name,
        columns.iter().map(String::as_str),
    );
    debug!(table, field = %field.name, temp_column = %temp_column, ?change, "re-encoding field column");

    tx.execute(&rename_column_sql(table, &field.name, &temp_column))?;
    tx.execute(&add_column_sql(
        table,
        &field.name,
        &field.column_type(tx.dialect()),
    ))?;
    tx.execute(&copy_values_sql(
        tx.dialect().json_predicates(),
        table,
        &field.name,
        &temp_column,
        change,
    ))?;
    // orphaned files or relations left by a multiple -> single flip are not cleaned up here
    tx.execute(&drop_column_sql(table, &temp_column))?;

    for view in &order.create_order {
        tx.execute(&view.create_sql)?;
    }

    info!(table, field = %field.name, ?change, views = views.len(), "normalized field cardinality");
    Ok(())
}

/// `UPDATE` that fills `target` from the renamed `source` column.
#[must_use]
pub fn copy_values_sql(
    json: &dyn JsonPredicates,
    table: &str,
    target: &str,
    source: &str,
    change: CardinalityChange,
) -> String {
    let source_column = quote_ident(source);
    let source_text = json.to_text(&source_column);

    let value = match change {
        CardinalityChange::SingleToMultiple => format!(
            "CASE WHEN COALESCE({source_text}, '') = '' THEN {empty} \
             ELSE (CASE WHEN {is_array} THEN {as_json} ELSE {singleton} END) END",
            empty = json.empty_array(),
            is_array = json.is_json_array(&source_text),
            as_json = json.to_json(&source_text),
            singleton = json.build_singleton_array(&source_column),
        ),
        CardinalityChange::MultipleToSingle => format!(
            "CASE WHEN COALESCE({source_text}, '[]') = '[]' THEN '' \
             ELSE (CASE WHEN {is_array} THEN COALESCE({last}, '') ELSE {source_text} END) END",
            is_array = json.is_json_array(&source_text),
            last = json.last_element(&source_text),
        ),
    };

    format!(
        "UPDATE {} SET {} = ({value})",
        quote_ident(table),
        quote_ident(target)
    )
}
