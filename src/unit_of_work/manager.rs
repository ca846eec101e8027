use std::sync::Arc;

use tracing::instrument;

use crate::id_generator::IdGenerator;
use crate::outbox::OutboxRepository;
use crate::store::Store;

use super::error::UnitOfWorkError;
use super::factory::UnitOfWorkFactory;
use super::unit_of_work::UnitOfWork;

/// Entry point for request handlers.
pub struct UnitOfWorkManager<St: Store, R> {
    factory: UnitOfWorkFactory<St, R>,
    outbox_repository: OutboxRepository<St>,
    id_generator: Arc<dyn IdGenerator>,
    aggregate_id_generator: Arc<str>,
}

impl<St: Store, R> Clone for UnitOfWorkManager<St, R> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            outbox_repository: self.outbox_repository.clone(),
            id_generator: Arc::clone(&self.id_generator),
            aggregate_id_generator: Arc::clone(&self.aggregate_id_generator),
        }
    }
}

impl<St: Store, R> UnitOfWorkManager<St, R> {
    pub fn new(
        factory: UnitOfWorkFactory<St, R>,
        outbox_repository: OutboxRepository<St>,
        id_generator: Arc<dyn IdGenerator>,
        aggregate_id_generator: impl Into<String>,
    ) -> Self {
        Self {
            factory,
            outbox_repository,
            id_generator,
            aggregate_id_generator: Arc::from(aggregate_id_generator.into()),
        }
    }

    pub fn factory(&self) -> &UnitOfWorkFactory<St, R> {
        &self.factory
    }

    /// Open the outbox of `request_id` and start a transactional unit of work
    /// on it.
    ///
    /// When an earlier attempt already committed, the returned unit of work's
    /// outbox is closed: skip business logic and only ensure dispatch.
    #[instrument(skip(self))]
    pub async fn begin(&self, request_id: &str) -> Result<UnitOfWork<St, R>, UnitOfWorkError> {
        let id_generator = &self.id_generator;
        let generator_name = &self.aggregate_id_generator;
        let outbox = self
            .outbox_repository
            .open(request_id, || id_generator.get_id(request_id, generator_name))
            .await?
            .into_outbox();

        self.factory.create(outbox).await
    }

    pub async fn begin_non_transactional(&self) -> Result<UnitOfWork<St, R>, UnitOfWorkError> {
        self.factory.create_non_transactional().await
    }
}
