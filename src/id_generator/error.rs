use thiserror::Error;

use crate::store::StoreError;

/// Error type for id generation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdGeneratorError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The key conflicted but no stored value could be read back.
    #[error("expected data not found for {idempotency_id} in generator {generator_name}")]
    MissingValue {
        idempotency_id: String,
        generator_name: String,
    },

    #[error("stored id for {idempotency_id} is not an integer")]
    InvalidValue { idempotency_id: String },
}
