use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::store::{
    InsertOutcome, QualifiedName, Row, RowKey, Session, Store, StoreError, StoreResult,
    TableSchema,
};

use super::error::IdGeneratorError;

const IDEMPOTENCY_ID: &str = "idempotency_id";
const GENERATOR_NAME: &str = "generator_name";
const VALUE: &str = "value";

/// Hands out ids that stay stable per idempotency id.
#[async_trait]
pub trait IdGenerator: Send + Sync {
    async fn get_id(
        &self,
        idempotency_id: &str,
        generator_name: &str,
    ) -> Result<i64, IdGeneratorError>;
}

#[derive(Debug)]
struct IdGeneratorSchema {
    default_schema: String,
    table: TableSchema,
}

/// Store-backed [`IdGenerator`].
///
/// Every call runs on its own session, outside any unit of work, so a unit of
/// work rolling back never takes an issued id back.
pub struct IdGeneratorRepository<St: Store> {
    store: St,
    table_name: Arc<str>,
    schema: Arc<OnceCell<IdGeneratorSchema>>,
}

impl<St: Store> Clone for IdGeneratorRepository<St> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            table_name: Arc::clone(&self.table_name),
            schema: Arc::clone(&self.schema),
        }
    }
}

impl<St: Store> IdGeneratorRepository<St> {
    pub fn new(store: St, table_name: impl Into<String>) -> Self {
        Self {
            store,
            table_name: Arc::from(table_name.into()),
            schema: Arc::new(OnceCell::new()),
        }
    }

    /// Table metadata, resolved by the first caller and shared afterwards.
    async fn schema(&self, session: &mut St::Session) -> StoreResult<&IdGeneratorSchema> {
        self.schema
            .get_or_try_init(|| async move {
                let default_schema = session.default_schema().await?;
                let table = TableSchema::new(
                    QualifiedName::resolve(&self.table_name, &default_schema),
                    [IDEMPOTENCY_ID, GENERATOR_NAME],
                );
                Ok::<_, StoreError>(IdGeneratorSchema {
                    default_schema,
                    table,
                })
            })
            .await
    }

    async fn get_id_with(
        &self,
        session: &mut St::Session,
        idempotency_id: &str,
        generator_name: &str,
    ) -> Result<i64, IdGeneratorError> {
        let schema = self.schema(session).await?;
        let sequence = QualifiedName::resolve(generator_name, &schema.default_schema);

        let next_value = session.next_value(&sequence).await?;

        let mut row = Row::new();
        row.insert(IDEMPOTENCY_ID.into(), json!(idempotency_id));
        row.insert(GENERATOR_NAME.into(), json!(generator_name));
        row.insert(VALUE.into(), json!(next_value));

        match session.insert(&schema.table, row).await? {
            InsertOutcome::Inserted => Ok(next_value),
            InsertOutcome::Conflict => {
                debug!(
                    idempotency_id,
                    generator_name,
                    discarded = next_value,
                    "id already issued, reading it back"
                );
                session.clear_tracked(&schema.table);

                let key = RowKey::new([idempotency_id, generator_name]);
                let stored = session.find(&schema.table, &key).await?.ok_or_else(|| {
                    IdGeneratorError::MissingValue {
                        idempotency_id: idempotency_id.to_string(),
                        generator_name: generator_name.to_string(),
                    }
                })?;

                stored
                    .get(VALUE)
                    .and_then(Value::as_i64)
                    .ok_or_else(|| IdGeneratorError::InvalidValue {
                        idempotency_id: idempotency_id.to_string(),
                    })
            }
        }
    }
}

#[async_trait]
impl<St: Store> IdGenerator for IdGeneratorRepository<St> {
    #[instrument(skip(self))]
    async fn get_id(
        &self,
        idempotency_id: &str,
        generator_name: &str,
    ) -> Result<i64, IdGeneratorError> {
        let mut session = self.store.connect().await?;
        let result = self
            .get_id_with(&mut session, idempotency_id, generator_name)
            .await;

        if let Err(error) = session.close().await {
            warn!(%error, "failed to close id generator session");
        }
        result
    }
}
