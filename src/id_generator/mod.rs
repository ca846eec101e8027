//! IdGenerator - stable ids keyed by idempotency id.
//!
//! The first call for a key advances the named sequence and records the value;
//! later calls for the same key get the recorded value back. The sequence is
//! advanced on every call, so ids are monotonic but may have gaps.

mod error;
mod repository;

pub use error::IdGeneratorError;
pub use repository::{IdGenerator, IdGeneratorRepository};
