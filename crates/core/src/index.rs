use std::{collections::BTreeSet, fmt::Write as _, sync::LazyLock};

use regex::Regex;

use crate::{Collection, ValidationError, sql::quote_ident};

static INDEX_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*create\s+(unique\s+)?index\s+(if\s+not\s+exists\s+)?(\S+?)\s+on\s+(\S+?)\s*(?:using\s+(\w+)\s*)?\(",
    )
    .expect("index header pattern must compile")
});

static INDEX_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(.+?)(?:\s+collate\s+(\w+))?(?:\s+(asc|desc))?$")
        .expect("index column pattern must compile")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexKind {
    Btree,
    Gin,
    Other(String),
}

impl IndexKind {
    fn from_method(method: &str) -> Self {
        match method.to_ascii_lowercase().as_str() {
            "btree" => Self::Btree,
            "gin" => Self::Gin,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    /// Plain column name or a raw expression such as `lower(title)`.
    pub name: String,
    pub collation: Option<String>,
    pub direction: Option<SortDirection>,
}

impl IndexColumn {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collation: None,
            direction: None,
        }
    }

    fn is_plain_identifier(&self) -> bool {
        !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIndex {
    pub schema_name: Option<String>,
    pub index_name: String,
    pub table_name: String,
    pub columns: Vec<IndexColumn>,
    pub unique: bool,
    pub if_not_exists: bool,
    pub partial_predicate: Option<String>,
    pub kind: IndexKind,
}

impl ParsedIndex {
    /// Returns `None` when `raw` is not shaped like a `CREATE INDEX` statement.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let header = INDEX_HEADER.captures(raw)?;
        let body_start = header.get(0)?.end();
        let body_len = matching_paren(&raw[body_start..])?;
        let body = &raw[body_start..body_start + body_len];
        let tail = raw[body_start + body_len + 1..]
            .trim()
            .trim_end_matches(';')
            .trim();

        let partial_predicate = if tail.is_empty() {
            None
        } else {
            let (keyword, predicate) = tail.split_at(tail.find(char::is_whitespace)?);
            if !keyword.eq_ignore_ascii_case("where") {
                return None;
            }
            Some(predicate.trim().to_string()).filter(|value| !value.is_empty())
        };

        let (schema_name, index_name) = split_qualified(&header[3]);
        let (_, table_name) = split_qualified(&header[4]);

        Some(Self {
            schema_name,
            index_name,
            table_name,
            columns: parse_columns(body),
            unique: header.get(1).is_some(),
            if_not_exists: header.get(2).is_some(),
            partial_predicate,
            kind: header
                .get(5)
                .map_or(IndexKind::Btree, |method| IndexKind::from_method(method.as_str())),
        })
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.index_name.is_empty() && !self.table_name.is_empty() && !self.columns.is_empty()
    }

    #[must_use]
    pub fn contains_column(&self, name: &str) -> bool {
        self.columns
            .iter()
            .any(|column| column.name.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn build(&self) -> String {
        self.render(true)
    }

    /// Renders the statement, degrading GIN to the default method when the engine lacks it.
    #[must_use]
    pub fn render(&self, supports_gin: bool) -> String {
        let mut sql = String::from("CREATE ");
        if self.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        if self.if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        if let Some(schema) = &self.schema_name {
            write!(sql, "{}.", quote_ident(schema)).expect("writing to String should not fail");
        }
        write!(
            sql,
            "{} ON {} ",
            quote_ident(&self.index_name),
            quote_ident(&self.table_name)
        )
        .expect("writing to String should not fail");

        match &self.kind {
            IndexKind::Btree => {}
            IndexKind::Gin if supports_gin => sql.push_str("USING GIN "),
            IndexKind::Gin => {}
            IndexKind::Other(method) => {
                write!(sql, "USING {method} ").expect("writing to String should not fail");
            }
        }

        let columns = self
            .columns
            .iter()
            .map(render_column)
            .collect::<Vec<_>>()
            .join(", ");
        write!(sql, "({columns})").expect("writing to String should not fail");

        if let Some(predicate) = &self.partial_predicate {
            write!(sql, " WHERE {predicate}").expect("writing to String should not fail");
        }

        sql
    }
}

fn render_column(column: &IndexColumn) -> String {
    let mut rendered = if column.is_plain_identifier() {
        quote_ident(&column.name)
    } else {
        column.name.clone()
    };

    if let Some(collation) = &column.collation {
        write!(rendered, " COLLATE {collation}").expect("writing to String should not fail");
    }
    match column.direction {
        Some(SortDirection::Asc) => rendered.push_str(" ASC"),
        Some(SortDirection::Desc) => rendered.push_str(" DESC"),
        None => {}
    }

    rendered
}

/// Parses every index of `collection`, keeping the valid ones and reporting the rest by position.
#[must_use]
pub fn parse_collection_indexes(collection: &Collection) -> (Vec<ParsedIndex>, ValidationError) {
    let mut parsed = Vec::new();
    let mut errors = ValidationError::new();
    let mut seen_names = BTreeSet::new();

    for (position, raw) in collection.indexes.iter().enumerate() {
        let Some(index) = ParsedIndex::parse(raw).filter(ParsedIndex::is_valid) else {
            errors.insert(position, "invalid CREATE INDEX expression");
            continue;
        };

        if !index.table_name.eq_ignore_ascii_case(&collection.name) {
            errors.insert(
                position,
                format!(
                    "index `{}` must target table `{}`, not `{}`",
                    index.index_name, collection.name, index.table_name
                ),
            );
            continue;
        }

        if !seen_names.insert(index.index_name.to_ascii_lowercase()) {
            errors.insert(
                position,
                format!("duplicate index name `{}`", index.index_name),
            );
            continue;
        }

        parsed.push(index);
    }

    (parsed, errors)
}

pub fn validate_indexes(collection: &Collection) -> Result<(), ValidationError> {
    let (_, errors) = parse_collection_indexes(collection);
    errors.into_result()
}

/// Byte length of `body` up to (not including) the parenthesis closing an already-open one.
fn matching_paren(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (offset, ch) in body.char_indices() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' | '`' => quote = Some(ch),
                '(' => depth += 1,
                ')' if depth == 0 => return Some(offset),
                ')' => depth -= 1,
                _ => {}
            },
        }
    }

    None
}

fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0usize;

    for (offset, ch) in body.char_indices() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' | '`' => quote = Some(ch),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    parts.push(&body[start..offset]);
                    start = offset + 1;
                }
                _ => {}
            },
        }
    }
    parts.push(&body[start..]);

    parts
}

fn parse_columns(body: &str) -> Vec<IndexColumn> {
    split_top_level(body)
        .into_iter()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .filter_map(|raw| {
            let captures = INDEX_COLUMN.captures(raw)?;
            let name = trim_identifier(captures[1].trim());
            if name.is_empty() {
                return None;
            }

            Some(IndexColumn {
                name,
                collation: captures.get(2).map(|value| value.as_str().to_string()),
                direction: captures.get(3).map(|value| {
                    if value.as_str().eq_ignore_ascii_case("desc") {
                        SortDirection::Desc
                    } else {
                        SortDirection::Asc
                    }
                }),
            })
        })
        .collect()
}

fn split_qualified(raw: &str) -> (Option<String>, String) {
    let parts = split_dotted(raw);
    match parts.as_slice() {
        [schema, name] => (Some(trim_identifier(schema)), trim_identifier(name)),
        _ => (None, trim_identifier(raw)),
    }
}

fn split_dotted(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0usize;

    for (offset, ch) in raw.char_indices() {
        match (quote, ch) {
            (Some(open), _) if ch == closing_quote(open) => quote = None,
            (Some(_), _) => {}
            (None, '"' | '`' | '[' | '\'') => quote = Some(ch),
            (None, '.') => {
                parts.push(&raw[start..offset]);
                start = offset + 1;
            }
            (None, _) => {}
        }
    }
    parts.push(&raw[start..]);

    parts
}

fn closing_quote(open: char) -> char {
    if open == '[' { ']' } else { open }
}

fn trim_identifier(raw: &str) -> String {
    let value = raw.trim();
    for (open, close) in [('"', '"'), ('`', '`'), ('[', ']'), ('\'', '\'')] {
        if value.len() >= 2 && value.starts_with(open) && value.ends_with(close) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}
