//! Store - the relational store collaborator.
//!
//! The unit of work, the outbox repository and the id generator only need a
//! handful of capabilities from the database:
//!
//! - one session (connection) per request, with begin / commit / rollback
//! - inserts that report a duplicate key as a value, not as a failure
//! - named sequences with a start value and an increment
//!
//! ```text
//! ┌──────────────┐   connect()   ┌───────────────────────────────┐
//! │    Store     │ ────────────▶ │ Session (one per unit of work)│
//! └──────────────┘               │ begin/commit/rollback         │
//!                                │ insert → Inserted | Conflict  │
//!                                │ update / update_if / find     │
//!                                │ next_value                    │
//!                                └───────────────────────────────┘
//! ```

mod error;
#[cfg(feature = "in-memory")]
mod in_memory;
mod schema;
mod session;

pub use error::{StoreError, StoreResult};
#[cfg(feature = "in-memory")]
pub use in_memory::{InMemorySession, InMemoryStore, StoreOperation};
pub use schema::{InsertOutcome, QualifiedName, Row, RowKey, TableSchema, UpdateOutcome};
pub use session::{Session, SessionGuard, SessionHandle, Store};
