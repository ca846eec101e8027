use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Column names of the outbox table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxColumns {
    pub request_id: String,
    pub aggregate_id: String,
    pub response: String,
    pub events: String,
    pub commands: String,
    pub is_stored: String,
    pub is_dispatched: String,
}

impl Default for OutboxColumns {
    fn default() -> Self {
        Self {
            request_id: "request_id".into(),
            aggregate_id: "aggregate_id".into(),
            response: "response".into(),
            events: "events".into(),
            commands: "commands".into(),
            is_stored: "is_stored".into(),
            is_dispatched: "is_dispatched".into(),
        }
    }
}

/// Outbox table layout and aggregate id allocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxOptions {
    pub table_name: String,
    pub columns: OutboxColumns,
    /// Generator the aggregate id of every outbox record is drawn from,
    /// keyed by the record's request id.
    pub aggregate_id_generator: String,
    pub start_aggregate_id_from: i64,
}

impl Default for OutboxOptions {
    fn default() -> Self {
        Self {
            table_name: "outbox".into(),
            columns: OutboxColumns::default(),
            aggregate_id_generator: "outbox_aggregate_id".into(),
            start_aggregate_id_from: 2,
        }
    }
}

/// A named monotonic counter backing [`crate::IdGenerator::get_id`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGeneratorOptions {
    pub sequence_name: String,
    #[serde(default = "default_start_number")]
    pub start_number: i64,
    #[serde(default = "default_increment_size")]
    pub increment_size: i32,
}

fn default_start_number() -> i64 {
    1
}

fn default_increment_size() -> i32 {
    1
}

impl IdGeneratorOptions {
    pub fn new(sequence_name: impl Into<String>) -> Self {
        Self {
            sequence_name: sequence_name.into(),
            start_number: default_start_number(),
            increment_size: default_increment_size(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sequence_name.trim().is_empty() {
            return Err(ConfigError::EmptySequenceName);
        }
        if self.increment_size <= 0 {
            return Err(ConfigError::NonPositiveIncrement {
                sequence: self.sequence_name.clone(),
                increment: self.increment_size,
            });
        }
        Ok(())
    }
}

/// Everything table- and sequence-related the idempotency components agree on.
///
/// ```ignore
/// let options = IdempotencyOptions::default()
///     .with_outbox_table("requests_outbox")
///     .add_id_generator("orders", 1, 1)?
///     .add_id_generator("invoices", 100, 10)?;
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyOptions {
    pub outbox: OutboxOptions,
    pub id_generator_table_name: String,
    pub id_generators: Vec<IdGeneratorOptions>,
}

impl Default for IdempotencyOptions {
    fn default() -> Self {
        Self {
            outbox: OutboxOptions::default(),
            id_generator_table_name: "id_generator".into(),
            id_generators: Vec::new(),
        }
    }
}

impl IdempotencyOptions {
    /// Parse and validate options from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_outbox_table(mut self, table_name: impl Into<String>) -> Self {
        self.outbox.table_name = table_name.into();
        self
    }

    pub fn with_id_generator_table(mut self, table_name: impl Into<String>) -> Self {
        self.id_generator_table_name = table_name.into();
        self
    }

    pub fn with_start_aggregate_id_from(mut self, start: i64) -> Self {
        self.outbox.start_aggregate_id_from = start;
        self
    }

    /// Register a generator. Rejected when the name is empty or the
    /// increment is not positive.
    pub fn add_id_generator(
        mut self,
        name: impl Into<String>,
        start_number: i64,
        increment_size: i32,
    ) -> Result<Self, ConfigError> {
        let generator = IdGeneratorOptions {
            sequence_name: name.into(),
            start_number,
            increment_size,
        };
        generator.validate()?;
        self.id_generators.push(generator);
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbox.table_name.trim().is_empty() {
            return Err(ConfigError::EmptyOutboxTableName);
        }
        if self.id_generator_table_name.trim().is_empty() {
            return Err(ConfigError::EmptyIdGeneratorTableName);
        }
        if self.outbox.aggregate_id_generator.trim().is_empty() {
            return Err(ConfigError::EmptyAggregateIdGenerator);
        }
        self.id_generators
            .iter()
            .try_for_each(IdGeneratorOptions::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_layout() {
        let options = IdempotencyOptions::default();
        assert_eq!(options.outbox.table_name, "outbox");
        assert_eq!(options.id_generator_table_name, "id_generator");
        assert_eq!(options.outbox.start_aggregate_id_from, 2);
        assert_eq!(options.outbox.columns.is_dispatched, "is_dispatched");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn add_id_generator_rejects_bad_generators() {
        let err = IdempotencyOptions::default()
            .add_id_generator("  ", 1, 1)
            .unwrap_err();
        assert!(matches!(err, ConfigError::EmptySequenceName));

        let err = IdempotencyOptions::default()
            .add_id_generator("orders", 1, 0)
            .unwrap_err();
        assert!(matches!(err, ConfigError::NonPositiveIncrement { increment: 0, .. }));
    }

    #[test]
    fn from_json_fills_defaults_and_validates() {
        let options = IdempotencyOptions::from_json(
            r#"{
                "outbox": { "table_name": "requests" },
                "id_generators": [{ "sequence_name": "invoices", "start_number": 100, "increment_size": 10 }]
            }"#,
        )
        .unwrap();

        assert_eq!(options.outbox.table_name, "requests");
        assert_eq!(options.outbox.columns, OutboxColumns::default());
        assert_eq!(options.id_generators[0].start_number, 100);

        let err = IdempotencyOptions::from_json(r#"{ "outbox": { "table_name": "" } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyOutboxTableName));
    }
}
