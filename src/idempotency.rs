//! Idempotency - wires the components together.
//!
//! ```ignore
//! let idempotency = Idempotency::builder(store.clone())
//!     .options(options)
//!     .dispatcher(Arc::new(dispatcher))
//!     .codec(EnvelopeCodec::builder().types(my_types).build())
//!     .repositories(|session| OrdersRepository::new(session.clone()))
//!     .build()?;
//!
//! let mut uow = idempotency.manager.begin("request-1").await?;
//! ```

use std::sync::Arc;

use crate::config::{ConfigError, IdempotencyOptions};
use crate::envelope::EnvelopeCodec;
use crate::id_generator::IdGeneratorRepository;
use crate::outbox::{LogDispatcher, OutboxDispatcher, OutboxReader, OutboxRepository};
use crate::store::{SessionHandle, Store};
use crate::unit_of_work::{Provisioner, UnitOfWorkFactory, UnitOfWorkManager};

/// Everything a service needs: the unit of work manager, the id generator
/// and read access to outboxes.
pub struct Idempotency<St: Store, R> {
    pub manager: UnitOfWorkManager<St, R>,
    pub id_generator: IdGeneratorRepository<St>,
    pub outbox_reader: OutboxReader<St>,
    pub options: IdempotencyOptions,
}

impl<St: Store> Idempotency<St, ()> {
    pub fn builder(store: St) -> IdempotencyBuilder<St, ()> {
        IdempotencyBuilder {
            store,
            options: IdempotencyOptions::default(),
            dispatcher: None,
            codec: None,
            provision: Arc::new(|_: &SessionHandle<St::Session>| ()),
        }
    }
}

/// Builder for [`Idempotency`].
pub struct IdempotencyBuilder<St: Store, R> {
    store: St,
    options: IdempotencyOptions,
    dispatcher: Option<Arc<dyn OutboxDispatcher>>,
    codec: Option<EnvelopeCodec>,
    provision: Provisioner<St::Session, R>,
}

impl<St: Store, R> IdempotencyBuilder<St, R> {
    pub fn options(mut self, options: IdempotencyOptions) -> Self {
        self.options = options;
        self
    }

    /// Dispatcher for outboxes. Defaults to [`LogDispatcher`].
    pub fn dispatcher(mut self, dispatcher: Arc<dyn OutboxDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Codec for outbox payloads. Defaults to one that only knows the
    /// built-in primitive types.
    pub fn codec(mut self, codec: EnvelopeCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Build the business repositories of every unit of work from its
    /// session.
    pub fn repositories<R2, F>(self, provision: F) -> IdempotencyBuilder<St, R2>
    where
        F: Fn(&SessionHandle<St::Session>) -> R2 + Send + Sync + 'static,
    {
        IdempotencyBuilder {
            store: self.store,
            options: self.options,
            dispatcher: self.dispatcher,
            codec: self.codec,
            provision: Arc::new(provision),
        }
    }

    pub fn build(self) -> Result<Idempotency<St, R>, ConfigError> {
        self.options.validate()?;

        let codec = self.codec.unwrap_or_default();
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Arc::new(LogDispatcher::new()));

        let outbox_repository =
            OutboxRepository::new(self.store.clone(), self.options.outbox.clone(), codec);
        let id_generator =
            IdGeneratorRepository::new(self.store.clone(), self.options.id_generator_table_name.clone());
        let factory = UnitOfWorkFactory::new(
            self.store,
            outbox_repository.clone(),
            dispatcher,
            self.provision,
        );
        let manager = UnitOfWorkManager::new(
            factory,
            outbox_repository.clone(),
            Arc::new(id_generator.clone()),
            self.options.outbox.aggregate_id_generator.clone(),
        );

        Ok(Idempotency {
            manager,
            id_generator,
            outbox_reader: OutboxReader::new(outbox_repository),
            options: self.options,
        })
    }
}

#[cfg(all(test, feature = "in-memory"))]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[test]
    fn invalid_options_are_rejected() {
        let result = Idempotency::builder(InMemoryStore::new())
            .options(IdempotencyOptions::default().with_outbox_table(""))
            .build();

        assert!(matches!(result, Err(ConfigError::EmptyOutboxTableName)));
    }

    #[tokio::test]
    async fn default_wiring_runs_a_unit_of_work() {
        let store = InMemoryStore::new();
        let idempotency = Idempotency::builder(store.clone()).build().unwrap();
        store.migrate(&idempotency.options).unwrap();

        let mut uow = idempotency.manager.begin("a").await.unwrap();
        assert_eq!(uow.outbox().unwrap().aggregate_id(), 2);
        uow.outbox_mut().unwrap().publish(1i64).unwrap();
        uow.commit().await.unwrap();
        uow.ensure_outbox_dispatched().await.unwrap();
        uow.dispose().await;

        let outbox = idempotency.outbox_reader.get_or_default("a").await.unwrap().unwrap();
        assert!(outbox.is_dispatched());
        assert_eq!(store.open_sessions(), 0);
    }
}
