use std::{collections::BTreeMap, error::Error as StdError, fmt};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

type BoxedSource = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Introspection(#[from] IntrospectionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Constraint(#[from] ConstraintViolation),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Execute(#[from] ExecutionError),
    #[error(transparent)]
    Maintenance(#[from] MaintenanceError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl Error {
    /// Walks through migration wrappers down to the statement that failed.
    #[must_use]
    pub fn execution(&self) -> Option<&ExecutionError> {
        match self {
            Self::Execute(error) => Some(error),
            Self::Migration(error) => error.source.execution(),
            Self::Constraint(violation) => violation.source.execution(),
            Self::Maintenance(MaintenanceError::Failed { source, .. }) => source.execution(),
            _ => None,
        }
    }

    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Introspection(_) => "introspection",
            Self::Validation(_) => "validation",
            Self::Constraint(_) => "constraint",
            Self::Migration(_) => "migration",
            Self::Execute(_) => "execute",
            Self::Maintenance(_) => "maintenance",
            Self::Parse(_) => "parse",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid connection config: {message}")]
    InvalidConfig { message: String },
    #[error("{dialect} connection failed: {source}")]
    Unreachable {
        dialect: &'static str,
        #[source]
        source: BoxedSource,
    },
    #[error("{dialect} server version `{raw}` is not supported; requires {minimum}+")]
    UnsupportedVersion {
        dialect: &'static str,
        raw: String,
        minimum: String,
    },
    #[error("failed to parse {dialect} server version string: `{raw}`")]
    InvalidVersion { dialect: &'static str, raw: String },
    #[error("{dialect} connection state was poisoned")]
    Poisoned { dialect: &'static str },
}

impl ConnectionError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn unreachable<E>(dialect: &'static str, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Unreachable {
            dialect,
            source: Box::new(source),
        }
    }
}

#[derive(Debug, Error)]
pub enum IntrospectionError {
    #[error("table `{table}` does not exist or has no columns")]
    MissingTable { table: String },
    #[error("catalog query failed for `{target}`: {source}")]
    QueryFailed {
        target: String,
        #[source]
        source: BoxedSource,
    },
}

impl IntrospectionError {
    pub fn query_failed<E>(target: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::QueryFailed {
            target: target.into(),
            source: Box::new(source),
        }
    }
}

/// Position-keyed problems found in a collection's index expressions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    errors: BTreeMap<usize, String>,
}

impl ValidationError {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, position: usize, message: impl Into<String>) {
        self.errors.insert(position, message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn get(&self, position: usize) -> Option<&str> {
        self.errors.get(&position).map(String::as_str)
    }

    #[must_use]
    pub fn positions(&self) -> Vec<usize> {
        self.errors.keys().copied().collect()
    }

    #[must_use]
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid indexes:")?;
        for (position, message) in &self.errors {
            write!(f, " indexes.{position}: {message};")?;
        }
        Ok(())
    }
}

impl StdError for ValidationError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unique => f.write_str("unique"),
            Self::ForeignKey => f.write_str("foreign key"),
        }
    }
}

#[derive(Debug, Error)]
#[error("{kind} constraint violated: {source}")]
pub struct ConstraintViolation {
    pub kind: ConstraintKind,
    #[source]
    pub source: Box<Error>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    CreateTable,
    DropIndexes,
    RenameTable,
    DropColumn,
    AddColumn,
    RenameColumn,
    FinalizeRename,
    NormalizeCardinality,
    CreateIndexes,
}

impl SyncPhase {
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::CreateTable => "create-table",
            Self::DropIndexes => "drop-indexes",
            Self::RenameTable => "rename-table",
            Self::DropColumn => "drop-column",
            Self::AddColumn => "add-column",
            Self::RenameColumn => "rename-column",
            Self::FinalizeRename => "finalize-rename",
            Self::NormalizeCardinality => "normalize-cardinality",
            Self::CreateIndexes => "create-indexes",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Error)]
#[error("record table sync for `{table}` failed during {phase}: {source}")]
pub struct MigrationError {
    pub table: String,
    pub phase: SyncPhase,
    #[source]
    pub source: Box<Error>,
}

impl MigrationError {
    pub fn new(table: impl Into<String>, phase: SyncPhase, source: Error) -> Self {
        Self {
            table: table.into(),
            phase,
            source: Box::new(source),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("statement failed (code={}): {sql}: {source}", code.as_deref().unwrap_or("none"))]
    StatementFailed {
        sql: String,
        code: Option<String>,
        #[source]
        source: BoxedSource,
    },
    #[error("transaction {step} failed: {source}")]
    Transaction {
        step: &'static str,
        #[source]
        source: BoxedSource,
    },
}

impl ExecutionError {
    pub fn statement_failed<E>(sql: impl Into<String>, code: Option<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::StatementFailed {
            sql: sql.into(),
            code,
            source: Box::new(source),
        }
    }

    pub fn transaction<E>(step: &'static str, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Transaction {
            step,
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::StatementFailed { code, .. } => code.as_deref(),
            Self::Transaction { .. } => None,
        }
    }

    /// Driver message used for substring classification, including every nested cause.
    #[must_use]
    pub fn message(&self) -> String {
        let source = match self {
            Self::StatementFailed { source, .. } | Self::Transaction { source, .. } => source,
        };

        let mut message = source.to_string();
        let mut cause = source.source();
        while let Some(error) = cause {
            message.push_str(": ");
            message.push_str(&error.to_string());
            cause = error.source();
        }
        message
    }
}

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("{operation} must run outside of a transaction")]
    InsideTransaction { operation: &'static str },
    #[error("{operation} failed: {source}")]
    Failed {
        operation: &'static str,
        #[source]
        source: Box<Error>,
    },
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot parse an empty timestamp")]
    EmptyTimestamp,
    #[error("timestamp `{raw}` does not match any accepted format")]
    UnrecognizedTimestamp { raw: String },
}
