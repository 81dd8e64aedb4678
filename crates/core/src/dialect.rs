use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::{
    ConnectionConfig, ConstraintKind, ConstraintViolation, DatabaseAdapter, Error, ParseError,
    PoolConfig, Result,
};

/// Engine-level feature switches consulted instead of dialect-name checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_row_locks: bool,
    pub supports_gin_indexes: bool,
}

/// Physical shape of a record column, independent of the engine spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    PrimaryKey,
    Text,
    Number,
    Bool,
    Json,
    JsonArray,
}

/// A scalar as handed over by a driver, before dialect decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    Blob(Vec<u8>),
}

pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;
    fn capabilities(&self) -> Capabilities;
    fn default_pool(&self) -> PoolConfig;
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn DatabaseAdapter>>;

    /// Column type plus default/nullability for the given shape.
    fn column_definition(&self, kind: ColumnKind) -> String;

    fn bool_value(&self, raw: &RawValue) -> bool {
        match raw {
            RawValue::Null => false,
            RawValue::Integer(value) => *value != 0,
            RawValue::Real(value) => *value != 0.0,
            RawValue::Bool(value) => *value,
            RawValue::Text(value) => parse_bool_text(value),
            RawValue::Blob(bytes) => std::str::from_utf8(bytes).is_ok_and(parse_bool_text),
        }
    }

    fn format_bool(&self, value: bool) -> RawValue;
    fn time_value(&self, raw: &str) -> Result<DateTime<Utc>>;
    fn format_time(&self, value: &DateTime<Utc>) -> String;
    fn json_predicates(&self) -> &'static dyn JsonPredicates;

    /// Collation clause or function-name hint for case-insensitive comparison.
    fn no_case_collation(&self) -> &'static str;

    fn is_unique_violation(&self, error: &Error) -> bool;
    fn is_foreign_key_violation(&self, error: &Error) -> bool;

    fn classify_violation(&self, error: Error) -> Error {
        let kind = if self.is_unique_violation(&error) {
            ConstraintKind::Unique
        } else if self.is_foreign_key_violation(&error) {
            ConstraintKind::ForeignKey
        } else {
            return error;
        };

        if matches!(error, Error::Constraint(_)) {
            return error;
        }

        ConstraintViolation {
            kind,
            source: Box::new(error),
        }
        .into()
    }

    /// Statement run after a successful sync, outside the transaction.
    fn post_sync_optimization(&self) -> Option<&'static str> {
        None
    }
}

/// Pure SQL expression builders used when re-encoding JSON-backed columns.
///
/// Every `text_expr` argument must already be a text-typed expression; use
/// [`JsonPredicates::to_text`] to coerce a column first.
pub trait JsonPredicates: Send + Sync {
    fn is_valid_json(&self, text_expr: &str) -> String;
    fn type_of(&self, text_expr: &str) -> String;
    fn build_singleton_array(&self, expr: &str) -> String;
    fn last_element(&self, text_expr: &str) -> String;
    fn to_json(&self, text_expr: &str) -> String;
    fn to_text(&self, expr: &str) -> String;
    fn empty_array(&self) -> &'static str;

    fn is_json_array(&self, text_expr: &str) -> String {
        format!(
            "(CASE WHEN {} THEN {} = 'array' ELSE FALSE END)",
            self.is_valid_json(text_expr),
            self.type_of(text_expr)
        )
    }
}

#[must_use]
pub fn parse_bool_text(raw: &str) -> bool {
    let value = raw.trim();
    ["true", "t", "1", "yes", "on"]
        .iter()
        .any(|candidate| value.eq_ignore_ascii_case(candidate))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLayout {
    Rfc3339,
    Offset(&'static str),
    Naive(&'static str),
    Date(&'static str),
}

pub const ISO_TIME_LAYOUTS: &[TimeLayout] = &[
    TimeLayout::Rfc3339,
    TimeLayout::Offset("%Y-%m-%dT%H:%M:%S%.f%#z"),
    TimeLayout::Naive("%Y-%m-%dT%H:%M:%S%.fZ"),
    TimeLayout::Naive("%Y-%m-%dT%H:%M:%S%.f"),
    TimeLayout::Naive("%Y-%m-%dT%H:%M:%S"),
    TimeLayout::Date("%Y-%m-%d"),
];

/// Tries the ISO layouts first, then the engine-native ones, normalizing to UTC.
pub fn parse_timestamp(raw: &str, native_layouts: &[TimeLayout]) -> Result<DateTime<Utc>> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ParseError::EmptyTimestamp.into());
    }

    ISO_TIME_LAYOUTS
        .iter()
        .chain(native_layouts)
        .find_map(|layout| parse_with_layout(value, *layout))
        .ok_or_else(|| {
            ParseError::UnrecognizedTimestamp {
                raw: raw.to_string(),
            }
            .into()
        })
}

fn parse_with_layout(value: &str, layout: TimeLayout) -> Option<DateTime<Utc>> {
    match layout {
        TimeLayout::Rfc3339 => DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc)),
        TimeLayout::Offset(format) => DateTime::parse_from_str(value, format)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc)),
        TimeLayout::Naive(format) => NaiveDateTime::parse_from_str(value, format)
            .ok()
            .map(|parsed| parsed.and_utc()),
        TimeLayout::Date(format) => NaiveDate::parse_from_str(value, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|parsed| parsed.and_utc()),
    }
}
