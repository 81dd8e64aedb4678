mod adapter;
mod cardinality;
mod collection;
mod config;
mod dialect;
mod error;
mod gin;
mod index;
mod lock_policy;
pub mod sql;
mod sync;
mod view_order;

pub use adapter::{DatabaseAdapter, SchemaExecutor, TableInfoRow, TransactionFn, ViewDefinition};
pub use cardinality::{CardinalityChange, copy_values_sql, normalize_cardinality_changes};
pub use collection::{Collection, CollectionKind, Field, FieldKind};
pub use config::{ConnectionConfig, PoolConfig, Version};
pub use dialect::{
    Capabilities, ColumnKind, Dialect, ISO_TIME_LAYOUTS, JsonPredicates, RawValue, TimeLayout,
    parse_bool_text, parse_timestamp,
};
pub use error::{
    ConnectionError, ConstraintKind, ConstraintViolation, Error, ExecutionError,
    IntrospectionError, MaintenanceError, MigrationError, ParseError, Result, SyncPhase,
    ValidationError,
};
pub use gin::{
    GinReport, ensure_gin_indexes, gin_candidate_fields, gin_index_name, missing_gin_indexes,
};
pub use index::{
    IndexColumn, IndexKind, ParsedIndex, SortDirection, parse_collection_indexes,
    validate_indexes,
};
pub use lock_policy::{
    CRITICAL_OPERATIONS, LockMode, LockPolicy, build_select_for_update_sql, lock_clause,
    lock_policy, locked_select_sql, recommended_lock_mode, should_use_pessimistic_lock,
};
pub use sync::{SchemaSynchronizer, SyncAction, SyncOutcome, sync_record_table_schema};
