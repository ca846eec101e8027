use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::OutboxOptions;
use crate::envelope::EnvelopeCodec;
use crate::id_generator::IdGeneratorError;
use crate::store::{
    InsertOutcome, QualifiedName, Session, Store, StoreError, StoreResult, UpdateOutcome,
};

use super::error::OutboxError;
use super::outbox::Outbox;
use super::record::OutboxSchema;

/// Why an outbox is being written back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutboxPersistingReason {
    /// Business logic finished; the outbox content becomes final.
    Storing,
    /// Every command and event has been handed to the dispatcher.
    Dispatching,
}

/// Result of [`OutboxRepository::open`].
#[derive(Clone, Debug)]
pub enum OpenOutcome {
    /// This call created the record.
    Inserted(Outbox),
    /// Another attempt with the same request id created it first.
    AlreadyExists(Outbox),
}

impl OpenOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, OpenOutcome::Inserted(_))
    }

    pub fn outbox(&self) -> &Outbox {
        match self {
            OpenOutcome::Inserted(outbox) | OpenOutcome::AlreadyExists(outbox) => outbox,
        }
    }

    pub fn into_outbox(self) -> Outbox {
        match self {
            OpenOutcome::Inserted(outbox) | OpenOutcome::AlreadyExists(outbox) => outbox,
        }
    }
}

/// Creates, reads and writes back outbox records.
///
/// The store's unique key on the request id decides which of several
/// concurrent attempts creates a record; no locks are taken.
pub struct OutboxRepository<St: Store> {
    store: St,
    options: Arc<OutboxOptions>,
    codec: EnvelopeCodec,
    schema: Arc<OnceCell<OutboxSchema>>,
}

impl<St: Store> Clone for OutboxRepository<St> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            options: Arc::clone(&self.options),
            codec: self.codec.clone(),
            schema: Arc::clone(&self.schema),
        }
    }
}

impl<St: Store> OutboxRepository<St> {
    pub fn new(store: St, options: OutboxOptions, codec: EnvelopeCodec) -> Self {
        Self {
            store,
            options: Arc::new(options),
            codec,
            schema: Arc::new(OnceCell::new()),
        }
    }

    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    async fn schema(&self, session: &mut St::Session) -> StoreResult<&OutboxSchema> {
        self.schema
            .get_or_try_init(|| async move {
                let default_schema = session.default_schema().await?;
                Ok::<_, StoreError>(OutboxSchema::new(
                    QualifiedName::resolve(&self.options.table_name, &default_schema),
                    self.options.columns.clone(),
                ))
            })
            .await
    }

    /// Create the outbox record for `request_id`, or load the one an earlier
    /// or concurrent attempt created.
    ///
    /// Runs on its own autocommitted session so the record exists before any
    /// unit of work starts.
    pub async fn open<F, Fut>(
        &self,
        request_id: &str,
        aggregate_id_factory: F,
    ) -> Result<OpenOutcome, OutboxError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<i64, IdGeneratorError>> + Send,
    {
        let mut session = self.store.connect().await?;
        let result = self
            .open_with(&mut session, request_id, aggregate_id_factory)
            .await;
        close(&mut session).await;
        result
    }

    async fn open_with<F, Fut>(
        &self,
        session: &mut St::Session,
        request_id: &str,
        aggregate_id_factory: F,
    ) -> Result<OpenOutcome, OutboxError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<i64, IdGeneratorError>> + Send,
    {
        let schema = self.schema(session).await?;
        let outbox = Outbox::new(request_id, aggregate_id_factory().await?);
        let row = schema.to_row(&outbox, &self.codec, false, false)?;

        match session.insert(schema.table(), row).await? {
            InsertOutcome::Inserted => Ok(OpenOutcome::Inserted(outbox)),
            InsertOutcome::Conflict => {
                debug!(request_id, "outbox already exists, loading it");
                // The rejected row is still tracked; reading it back would
                // return the fresh outbox instead of the stored one.
                session.clear_tracked(schema.table());

                let row = session
                    .find(schema.table(), &schema.key(request_id))
                    .await?
                    .ok_or_else(|| OutboxError::MalformedRecord {
                        request_id: request_id.to_string(),
                        reason: "record conflicted on insert but could not be read".into(),
                    })?;
                Ok(OpenOutcome::AlreadyExists(schema.from_row(&row, &self.codec)?))
            }
        }
    }

    /// Write `outbox` back on its own autocommitted session.
    pub async fn save(
        &self,
        outbox: &Outbox,
        reason: OutboxPersistingReason,
    ) -> Result<(), OutboxError> {
        let mut session = self.store.connect().await?;
        let result = self.save_with(&mut session, outbox, reason).await;
        close(&mut session).await;
        result
    }

    /// Write `outbox` back through `session`, joining its transaction if one
    /// is open. The flag matching `reason` is set in the written record; the
    /// in-memory outbox is left to the caller.
    ///
    /// A `Storing` write only lands on a record that is still unstored in the
    /// store, so a concurrent attempt that stored first keeps its content.
    pub async fn save_with(
        &self,
        session: &mut St::Session,
        outbox: &Outbox,
        reason: OutboxPersistingReason,
    ) -> Result<(), OutboxError> {
        if outbox.is_stored() && reason == OutboxPersistingReason::Storing {
            return Err(already_stored(outbox.request_id()));
        }
        if outbox.is_dispatched() && reason == OutboxPersistingReason::Dispatching {
            warn!(request_id = outbox.request_id(), "outbox already has been shipped");
            return Err(OutboxError::AlreadyDispatched {
                request_id: outbox.request_id().to_string(),
            });
        }

        let schema = self.schema(session).await?;
        let row = schema.to_row(
            outbox,
            &self.codec,
            outbox.is_stored() || reason == OutboxPersistingReason::Storing,
            outbox.is_dispatched() || reason == OutboxPersistingReason::Dispatching,
        )?;
        match reason {
            OutboxPersistingReason::Storing => {
                let outcome = session
                    .update_if(schema.table(), row, schema.is_stored_column(), &Value::Bool(false))
                    .await?;
                if outcome == UpdateOutcome::ConditionFailed {
                    return Err(already_stored(outbox.request_id()));
                }
            }
            OutboxPersistingReason::Dispatching => session.update(schema.table(), row).await?,
        }
        Ok(())
    }

    /// Commit the transaction a `Storing` [`save_with`](Self::save_with)
    /// joined. Losing the record to a concurrent attempt that committed
    /// first surfaces as [`OutboxError::AlreadyStored`].
    pub async fn commit_stored(
        &self,
        session: &mut St::Session,
        outbox: &Outbox,
    ) -> Result<(), OutboxError> {
        match session.commit().await {
            Ok(()) => Ok(()),
            Err(StoreError::ConditionFailed { ref table, .. }) if self.owns_table(table) => {
                Err(already_stored(outbox.request_id()))
            }
            Err(error) => Err(error.into()),
        }
    }

    fn owns_table(&self, table: &str) -> bool {
        self.schema
            .get()
            .is_some_and(|schema| schema.table().name().to_string() == table)
    }

    /// Read a record without opening anything.
    pub async fn find(&self, request_id: &str) -> Result<Option<Outbox>, OutboxError> {
        let mut session = self.store.connect().await?;
        let result = self.find_with(&mut session, request_id).await;
        close(&mut session).await;
        result
    }

    async fn find_with(
        &self,
        session: &mut St::Session,
        request_id: &str,
    ) -> Result<Option<Outbox>, OutboxError> {
        let schema = self.schema(session).await?;
        match session.find(schema.table(), &schema.key(request_id)).await? {
            Some(row) => Ok(Some(schema.from_row(&row, &self.codec)?)),
            None => Ok(None),
        }
    }
}

fn already_stored(request_id: &str) -> OutboxError {
    warn!(request_id, "outbox already has been stored");
    OutboxError::AlreadyStored {
        request_id: request_id.to_string(),
    }
}

async fn close<S: Session>(session: &mut S) {
    if let Err(error) = session.close().await {
        warn!(%error, "failed to close outbox session");
    }
}
