use serde_json::{json, Value};

use crate::config::OutboxColumns;
use crate::envelope::{AnyPayload, EnvelopeCodec};
use crate::store::{QualifiedName, Row, RowKey, TableSchema};

use super::error::OutboxError;
use super::outbox::Outbox;

/// Table and column layout of outbox records.
#[derive(Clone, Debug)]
pub(crate) struct OutboxSchema {
    table: TableSchema,
    columns: OutboxColumns,
}

impl OutboxSchema {
    pub(crate) fn new(table_name: QualifiedName, columns: OutboxColumns) -> Self {
        let table = TableSchema::new(table_name, [columns.request_id.clone()]);
        Self { table, columns }
    }

    pub(crate) fn table(&self) -> &TableSchema {
        &self.table
    }

    pub(crate) fn is_stored_column(&self) -> &str {
        &self.columns.is_stored
    }

    pub(crate) fn key(&self, request_id: &str) -> RowKey {
        RowKey::single(request_id)
    }

    /// Serialize an outbox with the given flags. Empty collections are stored
    /// as `null`.
    pub(crate) fn to_row(
        &self,
        outbox: &Outbox,
        codec: &EnvelopeCodec,
        is_stored: bool,
        is_dispatched: bool,
    ) -> Result<Row, OutboxError> {
        let response = match outbox.response_payload() {
            Some(response) => Value::String(codec.encode(response)?),
            None => Value::Null,
        };

        let mut row = Row::new();
        row.insert(self.columns.request_id.clone(), json!(outbox.request_id()));
        row.insert(self.columns.aggregate_id.clone(), json!(outbox.aggregate_id()));
        row.insert(self.columns.response.clone(), response);
        row.insert(self.columns.events.clone(), encode_all(codec, outbox.events())?);
        row.insert(self.columns.commands.clone(), encode_all(codec, outbox.commands())?);
        row.insert(self.columns.is_stored.clone(), json!(is_stored));
        row.insert(self.columns.is_dispatched.clone(), json!(is_dispatched));
        Ok(row)
    }

    pub(crate) fn from_row(&self, row: &Row, codec: &EnvelopeCodec) -> Result<Outbox, OutboxError> {
        let request_id = row
            .get(&self.columns.request_id)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("<unknown>", &self.columns.request_id))?;

        let aggregate_id = row
            .get(&self.columns.aggregate_id)
            .and_then(Value::as_i64)
            .ok_or_else(|| malformed(request_id, &self.columns.aggregate_id))?;

        let flag = |column: &str| -> Result<bool, OutboxError> {
            row.get(column)
                .and_then(Value::as_bool)
                .ok_or_else(|| malformed(request_id, column))
        };
        let is_stored = flag(&self.columns.is_stored)?;
        let is_dispatched = flag(&self.columns.is_dispatched)?;

        let response = match text_column(row, request_id, &self.columns.response)? {
            Some(text) => Some(codec.decode(text)?),
            None => None,
        };
        let events = match text_column(row, request_id, &self.columns.events)? {
            Some(text) => codec.decode_all(text)?,
            None => Vec::new(),
        };
        let commands = match text_column(row, request_id, &self.columns.commands)? {
            Some(text) => codec.decode_all(text)?,
            None => Vec::new(),
        };

        Ok(Outbox::restore(
            request_id,
            aggregate_id,
            is_stored,
            is_dispatched,
            response,
            events,
            commands,
        ))
    }
}

/// A nullable text column.
fn text_column<'r>(row: &'r Row, request_id: &str, column: &str) -> Result<Option<&'r str>, OutboxError> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.as_str())),
        Some(_) => Err(malformed(request_id, column)),
    }
}

fn encode_all(codec: &EnvelopeCodec, payloads: &[Box<dyn AnyPayload>]) -> Result<Value, OutboxError> {
    if payloads.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::String(codec.encode_all(payloads)?))
}

fn malformed(request_id: &str, column: &str) -> OutboxError {
    OutboxError::MalformedRecord {
        request_id: request_id.to_string(),
        reason: format!("column {} is missing or has the wrong type", column),
    }
}
