pub(crate) const SERVER_VERSION_QUERY: &str = "SHOW server_version";
pub(crate) const LIVENESS_QUERY: &str = "SELECT 1";

pub(crate) const HAS_TABLE_QUERY: &str = r#"
SELECT EXISTS (
  SELECT 1
  FROM pg_catalog.pg_class c
  JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
  WHERE n.nspname = current_schema()
    AND c.relkind IN ('r', 'p', 'v', 'm')
    AND lower(c.relname) = lower($1)
)
"#;

pub(crate) const TABLE_INFO_QUERY: &str = r#"
SELECT
  (row_number() OVER (ORDER BY a.attnum) - 1)::bigint AS position,
  a.attname::text AS name,
  pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
  a.attnotnull AS not_null,
  pg_catalog.pg_get_expr(d.adbin, d.adrelid) AS default_value,
  COALESCE(pk.indisprimary, false) AS primary_key
FROM pg_catalog.pg_attribute a
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
LEFT JOIN pg_catalog.pg_index pk
  ON pk.indrelid = c.oid AND pk.indisprimary AND a.attnum = ANY(pk.indkey)
WHERE n.nspname = current_schema()
  AND lower(c.relname) = lower($1)
  AND c.relkind IN ('r', 'p', 'v', 'm')
  AND a.attnum > 0
  AND NOT a.attisdropped
ORDER BY a.attnum
"#;

// Indexes backing PRIMARY KEY/UNIQUE constraints belong to the table definition.
pub(crate) const TABLE_INDEXES_QUERY: &str = r#"
SELECT ic.relname::text AS index_name, pg_catalog.pg_get_indexdef(ic.oid) AS index_sql
FROM pg_catalog.pg_index x
JOIN pg_catalog.pg_class ic ON ic.oid = x.indexrelid
JOIN pg_catalog.pg_class tc ON tc.oid = x.indrelid
JOIN pg_catalog.pg_namespace n ON n.oid = tc.relnamespace
WHERE n.nspname = current_schema()
  AND lower(tc.relname) = lower($1)
  AND NOT EXISTS (
    SELECT 1 FROM pg_catalog.pg_constraint con WHERE con.conindid = ic.oid
  )
ORDER BY ic.relname
"#;

pub(crate) const VIEWS_QUERY: &str = r#"
SELECT c.relname::text AS view_name, pg_catalog.pg_get_viewdef(c.oid, true) AS definition
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = current_schema() AND c.relkind = 'v'
ORDER BY c.relname
"#;

pub(crate) const ANALYZE_SQL: &str = "ANALYZE";
