use recordsync_core::JsonPredicates;

/// jsonb expressions. Validity is probed with `pg_input_is_valid` so malformed
/// text never raises inside an `UPDATE`.
pub(crate) struct PostgresJson;

pub(crate) static POSTGRES_JSON: PostgresJson = PostgresJson;

impl JsonPredicates for PostgresJson {
    fn is_valid_json(&self, text_expr: &str) -> String {
        format!("pg_input_is_valid({text_expr}, 'jsonb')")
    }

    fn type_of(&self, text_expr: &str) -> String {
        format!("jsonb_typeof(({text_expr})::jsonb)")
    }

    fn build_singleton_array(&self, expr: &str) -> String {
        format!("jsonb_build_array({expr})")
    }

    fn last_element(&self, text_expr: &str) -> String {
        format!("(({text_expr})::jsonb ->> -1)")
    }

    fn to_json(&self, text_expr: &str) -> String {
        format!("({text_expr})::jsonb")
    }

    fn to_text(&self, expr: &str) -> String {
        format!("({expr})::text")
    }

    fn empty_array(&self) -> &'static str {
        "'[]'::jsonb"
    }
}
