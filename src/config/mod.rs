//! Configuration of table names, column names and id generators.

mod error;
mod options;

pub use error::ConfigError;
pub use options::{IdGeneratorOptions, IdempotencyOptions, OutboxColumns, OutboxOptions};
