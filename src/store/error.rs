use thiserror::Error;

/// Error type for store sessions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("table {0} not found")]
    TableNotFound(String),

    #[error("sequence {0} not found")]
    SequenceNotFound(String),

    #[error("row {key} not found in table {table}")]
    RowNotFound { table: String, key: String },

    /// A buffered insert collided with a row committed by another session.
    #[error("unique constraint violated on table {table} for key {key}")]
    UniqueViolation { table: String, key: String },

    /// A conditional update found the row changed by another session at commit.
    #[error("row {key} in table {table} changed before commit")]
    ConditionFailed { table: String, key: String },

    /// A sequence ran past the range of `i64`.
    #[error("sequence {0} is exhausted")]
    SequenceExhausted(String),

    #[error("row for table {table} is missing key column {column}")]
    MissingKeyColumn { table: String, column: String },

    #[error("session is closed")]
    SessionClosed,

    #[error("no transaction in progress")]
    NoTransaction,

    #[error("a transaction is already in progress")]
    TransactionInProgress,

    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),

    #[error("connection failure: {0}")]
    Connection(String),

    #[error("command timed out: {0}")]
    Timeout(String),
}

impl StoreError {
    /// Failures the caller may recover from by retrying with the same
    /// idempotency key.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Connection(_) | StoreError::Timeout(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
