//! Error types for the ledger.

use thiserror::Error;

/// Policy violations caught at the submission/withdrawal boundary.
/// Raised before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("sender and receiver cannot be the same")]
    SameParty,
    #[error("amount must be greater than zero")]
    NonPositiveAmount,
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{field} must be at most {max} characters")]
    FieldTooLong { field: &'static str, max: usize },
    #[error("transaction {0} is already settled and cannot be deleted")]
    AlreadySettled(u64),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("transaction {0} not found")]
    TransactionNotFound(u64),
    #[error("transaction {0} is no longer pending")]
    StaleSnapshot(u64),
    #[error("gave up mining after {0} conflicting commits")]
    ContentionExhausted(u32),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("corrupt ledger record: {0}")]
    Corrupt(String),
    #[error("ledger lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;
