use std::sync::Arc;

use tracing::warn;

use crate::outbox::{Outbox, OutboxDispatcher, OutboxRepository};
use crate::store::{Session, SessionHandle, Store};

use super::error::UnitOfWorkError;
use super::unit_of_work::UnitOfWork;

/// Builds the business repositories of a unit of work from its session.
pub type Provisioner<S, R> = Arc<dyn Fn(&SessionHandle<S>) -> R + Send + Sync>;

/// Creates units of work, each on a fresh session.
pub struct UnitOfWorkFactory<St: Store, R> {
    store: St,
    outbox_repository: OutboxRepository<St>,
    dispatcher: Arc<dyn OutboxDispatcher>,
    provision: Provisioner<St::Session, R>,
}

impl<St: Store, R> Clone for UnitOfWorkFactory<St, R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            outbox_repository: self.outbox_repository.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
            provision: Arc::clone(&self.provision),
        }
    }
}

impl<St: Store, R> UnitOfWorkFactory<St, R> {
    pub fn new(
        store: St,
        outbox_repository: OutboxRepository<St>,
        dispatcher: Arc<dyn OutboxDispatcher>,
        provision: Provisioner<St::Session, R>,
    ) -> Self {
        Self {
            store,
            outbox_repository,
            dispatcher,
            provision,
        }
    }

    /// A transactional unit of work bound to `outbox`.
    pub async fn create(&self, outbox: Outbox) -> Result<UnitOfWork<St, R>, UnitOfWorkError> {
        let mut session = self.store.connect().await?;
        if let Err(error) = session.begin().await {
            if let Err(close_error) = session.close().await {
                warn!(error = %close_error, "failed to close session after failed begin");
            }
            return Err(error.into());
        }

        let session = SessionHandle::new(session);
        let repositories = (self.provision)(&session);
        Ok(UnitOfWork::transactional(
            session,
            repositories,
            outbox,
            self.outbox_repository.clone(),
            Arc::clone(&self.dispatcher),
        ))
    }

    /// A unit of work without a transaction or an outbox, for read paths.
    pub async fn create_non_transactional(&self) -> Result<UnitOfWork<St, R>, UnitOfWorkError> {
        let session = SessionHandle::new(self.store.connect().await?);
        let repositories = (self.provision)(&session);
        Ok(UnitOfWork::non_transactional(session, repositories))
    }
}
