use thiserror::Error;

use crate::outbox::{DispatchError, OutboxError};
use crate::store::StoreError;

use super::unit_of_work::UnitOfWorkState;

/// Error type for unit of work operations.
#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    /// Outbox access, commit, rollback and dispatch need a transaction.
    #[error("unit of work is non-transactional, {operation} is not available")]
    NonTransactional { operation: &'static str },

    #[error("cannot {operation} a unit of work in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: UnitOfWorkState,
    },

    /// Only a committed outbox can be dispatched.
    #[error("outbox {request_id} has not been stored yet")]
    OutboxNotStored { request_id: String },

    #[error(transparent)]
    Outbox(#[from] OutboxError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

impl UnitOfWorkError {
    /// Programming errors, as opposed to failures a retry with the same
    /// idempotency key can recover from.
    pub fn is_invariant_violation(&self) -> bool {
        match self {
            UnitOfWorkError::NonTransactional { .. }
            | UnitOfWorkError::InvalidState { .. }
            | UnitOfWorkError::OutboxNotStored { .. } => true,
            UnitOfWorkError::Outbox(error) => error.is_invariant_violation(),
            UnitOfWorkError::Store(_) | UnitOfWorkError::Dispatch(_) => false,
        }
    }
}
