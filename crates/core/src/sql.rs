use rand::Rng;

const TEMP_SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const TEMP_SUFFIX_LEN: usize = 5;

#[must_use]
pub fn quote_ident(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[must_use]
pub fn create_table_sql(table: &str, columns: &[(String, String)]) -> String {
    let definitions = columns
        .iter()
        .map(|(name, definition)| format!("{} {definition}", quote_ident(name)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({definitions})", quote_ident(table))
}

#[must_use]
pub fn rename_table_sql(from: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME TO {}",
        quote_ident(from),
        quote_ident(to)
    )
}

#[must_use]
pub fn add_column_sql(table: &str, column: &str, definition: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} {definition}",
        quote_ident(table),
        quote_ident(column)
    )
}

#[must_use]
pub fn rename_column_sql(table: &str, from: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {}",
        quote_ident(table),
        quote_ident(from),
        quote_ident(to)
    )
}

#[must_use]
pub fn drop_column_sql(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {}",
        quote_ident(table),
        quote_ident(column)
    )
}

#[must_use]
pub fn drop_index_sql(index: &str) -> String {
    format!("DROP INDEX IF EXISTS {}", quote_ident(index))
}

#[must_use]
pub fn drop_view_sql(view: &str) -> String {
    format!("DROP VIEW IF EXISTS {}", quote_ident(view))
}

/// `base` plus a short lowercase random token, retried until it collides with nothing in `taken`.
pub fn temp_name<'a, I>(prefix: &str, base: &str, taken: I) -> String
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    let mut rng = rand::thread_rng();
    loop {
        let suffix = (0..TEMP_SUFFIX_LEN)
            .map(|_| {
                let index = rng.gen_range(0..TEMP_SUFFIX_ALPHABET.len());
                char::from(TEMP_SUFFIX_ALPHABET[index])
            })
            .collect::<String>();
        let candidate = format!("{prefix}{base}{suffix}");

        if !taken
            .clone()
            .into_iter()
            .any(|name| name.eq_ignore_ascii_case(&candidate))
        {
            return candidate;
        }
    }
}
