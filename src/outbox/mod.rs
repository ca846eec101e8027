//! Outbox - the durable record of a request's side effects.
//!
//! ```text
//! open ──▶ is_stored=false ──commit (Storing)──▶ is_stored=true
//!                                                     │
//!                      ensure_outbox_dispatched (Dispatching)
//!                                                     ▼
//!                                              is_dispatched=true
//! ```
//!
//! Both flags only move forward. Writing a record back for a reason it has
//! already been written for is rejected with [`OutboxError::AlreadyStored`]
//! or [`OutboxError::AlreadyDispatched`].

mod dispatcher;
mod error;
mod outbox;
mod reader;
mod record;
mod repository;

pub use dispatcher::{DispatchError, InMemoryOutboxDispatcher, LogDispatcher, OutboxDispatcher};
pub use error::OutboxError;
pub use outbox::Outbox;
pub use reader::OutboxReader;
pub use repository::{OpenOutcome, OutboxPersistingReason, OutboxRepository};
