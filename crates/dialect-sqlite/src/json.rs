use recordsync_core::JsonPredicates;

/// JSON1 expressions; the functions accept text directly so no casts are needed.
pub(crate) struct SqliteJson;

pub(crate) static SQLITE_JSON: SqliteJson = SqliteJson;

impl JsonPredicates for SqliteJson {
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
