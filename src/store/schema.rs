//! Table, key and row shapes shared by every component that talks to the store.

use std::fmt;

use serde_json::{Map, Value};

use super::error::{StoreError, StoreResult};

/// A row: column name to value.
pub type Row = Map<String, Value>;

/// Schema-qualified object name (`schema.name`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    schema: Option<String>,
    name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    pub fn unqualified(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// Qualify `name` with `default_schema` unless it already carries a schema.
    pub fn resolve(name: &str, default_schema: &str) -> Self {
        match name.split_once('.') {
            Some((schema, name)) => Self::new(schema, name),
            None => Self::new(default_schema, name),
        }
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Ordered primary key values of a row.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RowKey(Vec<String>);

impl RowKey {
    pub fn new<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        RowKey(values.into_iter().map(|v| v.into().to_string()).collect())
    }

    pub fn single(value: impl Into<Value>) -> Self {
        Self::new([value])
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.join(", "))
    }
}

/// Table name plus the columns that form its primary key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSchema {
    name: QualifiedName,
    key_columns: Vec<String>,
}

impl TableSchema {
    pub fn new<I, C>(name: QualifiedName, key_columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        Self {
            name,
            key_columns: key_columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    /// Extract the primary key of `row`.
    pub fn key_of(&self, row: &Row) -> StoreResult<RowKey> {
        let mut values = Vec::with_capacity(self.key_columns.len());
        for column in &self.key_columns {
            let value = row.get(column).ok_or_else(|| StoreError::MissingKeyColumn {
                table: self.name.to_string(),
                column: column.clone(),
            })?;
            values.push(value.clone());
        }
        Ok(RowKey::new(values))
    }
}

/// Outcome of an insert: the store, not the caller, decides who was first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Conflict,
}

/// Outcome of a conditional update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The stored row no longer matches the expected value; nothing was written.
    ConditionFailed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_qualifies_bare_names_only() {
        assert_eq!(
            QualifiedName::resolve("orders_seq", "tests").to_string(),
            "tests.orders_seq"
        );
        assert_eq!(
            QualifiedName::resolve("billing.orders_seq", "tests").to_string(),
            "billing.orders_seq"
        );
    }

    #[test]
    fn key_of_follows_key_column_order() {
        let table = TableSchema::new(QualifiedName::new("s", "t"), ["b", "a"]);
        let mut row = Row::new();
        row.insert("a".into(), json!("x"));
        row.insert("b".into(), json!(7));

        assert_eq!(table.key_of(&row).unwrap(), RowKey::new([json!(7), json!("x")]));
    }

    #[test]
    fn key_of_reports_missing_column() {
        let table = TableSchema::new(QualifiedName::new("s", "t"), ["id"]);
        let err = table.key_of(&Row::new()).unwrap_err();
        assert_eq!(
            err,
            StoreError::MissingKeyColumn {
                table: "s.t".into(),
                column: "id".into()
            }
        );
    }
}
