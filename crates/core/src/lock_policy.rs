//! Static catalog of record-mutation paths that benefit from pessimistic row locks.
//!
//! The registry is read-only process-wide data. Callers decide whether to append
//! a locking clause to a read, and must skip it entirely when the dialect cannot
//! express row locks.

use crate::{Dialect, sql::quote_ident};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    None,
    ForUpdate,
    ForShare,
    ForUpdateNoWait,
    ForUpdateSkipLocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub operation: &'static str,
    pub mode: LockMode,
    pub affected_tables: &'static [&'static str],
    pub rationale: &'static str,
}

pub const CRITICAL_OPERATIONS: &[LockPolicy] = &[
    LockPolicy {
        operation: "record_update",
        mode: LockMode::ForUpdate,
        affected_tables: &[],
        rationale: "read-modify-write of a single record must not interleave with another writer",
    },
    LockPolicy {
        operation: "record_delete",
        mode: LockMode::ForUpdate,
        affected_tables: &[],
        rationale: "cascading deletes read the row before removing dependents",
    },
    LockPolicy {
        operation: "relation_cascade",
        mode: LockMode::ForUpdate,
        affected_tables: &[],
        rationale: "referencing records are rewritten after the referenced row is gone",
    },
    LockPolicy {
        operation: "auth_password_change",
        mode: LockMode::ForUpdateNoWait,
        affected_tables: &["_superusers", "users"],
        rationale: "token key rotation must fail fast instead of queueing behind a login",
    },
    LockPolicy {
        operation: "auth_email_change",
        mode: LockMode::ForUpdate,
        affected_tables: &["_superusers", "users"],
        rationale: "email uniqueness is checked before the new address is written",
    },
    LockPolicy {
        operation: "otp_consume",
        mode: LockMode::ForUpdate,
        affected_tables: &["_otps"],
        rationale: "a one-time password is valid for exactly one successful exchange",
    },
    LockPolicy {
        operation: "mfa_consume",
        mode: LockMode::ForUpdate,
        affected_tables: &["_mfas"],
        rationale: "a second factor session is consumed once",
    },
    LockPolicy {
        operation: "external_auth_link",
        mode: LockMode::ForShare,
        affected_tables: &["_externalAuths"],
        rationale: "the linked record must not disappear while the provider link is created",
    },
    LockPolicy {
        operation: "job_claim",
        mode: LockMode::ForUpdateSkipLocked,
        affected_tables: &[],
        rationale: "concurrent workers claim disjoint rows without blocking each other",
    },
    LockPolicy {
        operation: "record_view",
        mode: LockMode::None,
        affected_tables: &[],
        rationale: "plain reads rely on statement-level snapshot isolation",
    },
];

#[must_use]
pub fn lock_policy(operation: &str) -> Option<&'static LockPolicy> {
    CRITICAL_OPERATIONS
        .iter()
        .find(|policy| policy.operation == operation)
}

#[must_use]
pub fn recommended_lock_mode(operation: &str) -> LockMode {
    lock_policy(operation).map_or(LockMode::None, |policy| policy.mode)
}

/// Always false when the dialect cannot express row locks, catalogued or not.
#[must_use]
pub fn should_use_pessimistic_lock(operation: &str, dialect_supports_row_locks: bool) -> bool {
    if !dialect_supports_row_locks {
        return false;
    }

    recommended_lock_mode(operation) != LockMode::None
}

#[must_use]
pub const fn lock_clause(mode: LockMode) -> &'static str {
    match mode {
        LockMode::None => "",
        LockMode::ForUpdate => "FOR UPDATE",
        LockMode::ForShare => "FOR SHARE",
        LockMode::ForUpdateNoWait => "FOR UPDATE NOWAIT",
        LockMode::ForUpdateSkipLocked => "FOR UPDATE SKIP LOCKED",
    }
}

#[must_use]
pub fn build_select_for_update_sql(table: &str, where_clause: &str, mode: LockMode) -> String {
    let mut sql = format!("SELECT * FROM {}", quote_ident(table));

    let condition = where_clause.trim();
    if !condition.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(condition);
    }

    let clause = lock_clause(mode);
    if !clause.is_empty() {
        sql.push(' ');
        sql.push_str(clause);
    }

    sql
}

/// Locked read for `operation`, or a plain read when the dialect or catalog says no lock.
#[must_use]
pub fn locked_select_sql(
    operation: &str,
    dialect: &dyn Dialect,
    table: &str,
    where_clause: &str,
) -> String {
    let mode = if should_use_pessimistic_lock(operation, dialect.capabilities().supports_row_locks)
    {
        recommended_lock_mode(operation)
    } else {
        LockMode::None
    };

    build_select_for_update_sql(table, where_clause, mode)
}
