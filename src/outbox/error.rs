use thiserror::Error;

use crate::envelope::CodecError;
use crate::id_generator::IdGeneratorError;
use crate::store::StoreError;

use super::dispatcher::DispatchError;

/// Error type for outbox operations.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// The outbox was stored by an earlier attempt; its content is final.
    #[error("outbox {request_id} is closed")]
    Closed { request_id: String },

    #[error("response of outbox {request_id} has already been set")]
    ResponseAlreadySet { request_id: String },

    #[error("response of outbox {request_id} is {actual}, not {expected}")]
    ResponseTypeMismatch {
        request_id: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("outbox {request_id} already has been stored")]
    AlreadyStored { request_id: String },

    #[error("outbox {request_id} already has been shipped")]
    AlreadyDispatched { request_id: String },

    #[error("outbox record {request_id} is malformed: {reason}")]
    MalformedRecord { request_id: String, reason: String },

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("aggregate id allocation failed: {0}")]
    IdGenerator(#[from] IdGeneratorError),

    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

impl OutboxError {
    /// Programming errors: retrying the same call can never succeed.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            OutboxError::Closed { .. }
                | OutboxError::ResponseAlreadySet { .. }
                | OutboxError::AlreadyStored { .. }
                | OutboxError::AlreadyDispatched { .. }
        )
    }
}
