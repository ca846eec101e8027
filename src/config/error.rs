use thiserror::Error;

/// Error type for invalid idempotency configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("outbox table name should be not empty")]
    EmptyOutboxTableName,

    #[error("ID generator table name should be not empty")]
    EmptyIdGeneratorTableName,

    #[error("outbox aggregate ID generator name should be not empty")]
    EmptyAggregateIdGenerator,

    #[error("ID generator sequence name should be not empty")]
    EmptySequenceName,

    #[error("ID generator {sequence} increment size should be positive number, got {increment}")]
    NonPositiveIncrement { sequence: String, increment: i32 },

    #[error("failed to parse idempotency options: {0}")]
    Parse(#[from] serde_json::Error),
}
