use idempotency_outbox::{
    InMemorySession, InMemoryStore, InsertOutcome, QualifiedName, Row, RowKey, Session,
    SessionHandle, Store, StoreError, StoreResult, TableSchema,
};
use serde_json::{json, Value};

/// Business repository bound to the session of a unit of work.
#[derive(Clone)]
pub struct TestEntities {
    session: SessionHandle<InMemorySession>,
    table: TableSchema,
}

impl TestEntities {
    pub const TABLE: &'static str = "test_entities";

    pub fn new(session: SessionHandle<InMemorySession>) -> Self {
        Self {
            session,
            table: table(),
        }
    }

    pub async fn add(&self, id: i64, name: &str) -> StoreResult<()> {
        let mut row = Row::new();
        row.insert("id".into(), json!(id));
        row.insert("name".into(), json!(name));

        let mut session = self.session.lock().await?;
        match session.insert(&self.table, row).await? {
            InsertOutcome::Inserted => Ok(()),
            InsertOutcome::Conflict => Err(StoreError::UniqueViolation {
                table: self.table.name().to_string(),
                key: id.to_string(),
            }),
        }
    }

    pub async fn get_name_or_default(&self, id: i64) -> StoreResult<Option<String>> {
        let mut session = self.session.lock().await?;
        let row = session.find(&self.table, &RowKey::single(id)).await?;
        Ok(name_of(row))
    }
}

/// Read a committed name on a session of its own.
pub async fn read_name(store: &InMemoryStore, id: i64) -> Option<String> {
    let mut session = store.connect().await.unwrap();
    let row = session.find(&table(), &RowKey::single(id)).await.unwrap();
    session.close().await.unwrap();
    name_of(row)
}

fn table() -> TableSchema {
    TableSchema::new(
        QualifiedName::new(InMemoryStore::DEFAULT_SCHEMA, TestEntities::TABLE),
        ["id"],
    )
}

fn name_of(row: Option<Row>) -> Option<String> {
    row.and_then(|row| row.get("name").and_then(Value::as_str).map(str::to_string))
}
