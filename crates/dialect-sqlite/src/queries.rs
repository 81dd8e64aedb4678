pub(crate) const SERVER_VERSION_QUERY: &str = "SELECT sqlite_version()";
pub(crate) const LIVENESS_QUERY: &str = "SELECT 1";

pub(crate) const HAS_TABLE_QUERY: &str = r#"
SELECT count(*)
FROM sqlite_master
WHERE type IN ('table', 'view') AND LOWER(name) = LOWER(?1);
"#;

pub(crate) const TABLE_INFO_QUERY: &str = r#"
SELECT cid, name, type, "notnull", dflt_value, pk
FROM pragma_table_info(?1)
ORDER BY cid ASC;
"#;

// Automatically generated indexes (UNIQUE/PRIMARY KEY constraints) have NULL SQL.
pub(crate) const TABLE_INDEXES_QUERY: &str = r#"
SELECT name, sql
FROM sqlite_master
WHERE type = 'index' AND sql IS NOT NULL AND tbl_name = ?1 COLLATE NOCASE
ORDER BY name ASC;
"#;

pub(crate) const VIEWS_QUERY: &str = r#"
SELECT name, sql
FROM sqlite_master
WHERE type = 'view' AND sql IS NOT NULL
ORDER BY name ASC;
"#;

pub(crate) const VACUUM_SQL: &str = "VACUUM";
pub(crate) const OPTIMIZE_SQL: &str = "PRAGMA optimize";
