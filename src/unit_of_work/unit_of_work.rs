use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::outbox::{
    Outbox, OutboxDispatcher, OutboxError, OutboxPersistingReason, OutboxRepository,
};
use crate::store::{Session, SessionHandle, Store};

use super::error::UnitOfWorkError;

/// Lifecycle of a [`UnitOfWork`].
///
/// ```text
/// Open ──commit──▶ Committed ──┐
///   │                          ├──dispose──▶ Disposed
///   └──rollback──▶ RolledBack ─┘
/// ```
///
/// `Disposed` is reachable from every state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitOfWorkState {
    Open,
    Committed,
    RolledBack,
    Disposed,
}

/// What only a transactional unit of work has.
struct Transaction<St: Store> {
    outbox: Outbox,
    outbox_repository: OutboxRepository<St>,
    dispatcher: Arc<dyn OutboxDispatcher>,
}

/// One attempt at handling one request.
///
/// Owns a session (and, in transactional mode, the transaction on it and the
/// request's outbox). Business repositories `R` are bound to the same
/// session and stop working once the unit of work is disposed.
///
/// ```ignore
/// let mut uow = manager.begin(&request_id).await?;
/// if !uow.outbox()?.is_closed() {
///     uow.repositories().orders.add(&order).await?;
///     uow.outbox_mut()?.publish(OrderPlaced { id: order.id })?;
///     uow.outbox_mut()?.return_response(order.id)?;
///     uow.commit().await?;
/// }
/// uow.ensure_outbox_dispatched().await?;
/// let response = uow.outbox()?.response::<u64>()?.copied();
/// uow.dispose().await;
/// ```
pub struct UnitOfWork<St: Store, R> {
    session: SessionHandle<St::Session>,
    transaction: Option<Transaction<St>>,
    repositories: R,
    state: UnitOfWorkState,
}

impl<St: Store, R> UnitOfWork<St, R> {
    pub(crate) fn transactional(
        session: SessionHandle<St::Session>,
        repositories: R,
        outbox: Outbox,
        outbox_repository: OutboxRepository<St>,
        dispatcher: Arc<dyn OutboxDispatcher>,
    ) -> Self {
        Self {
            session,
            transaction: Some(Transaction {
                outbox,
                outbox_repository,
                dispatcher,
            }),
            repositories,
            state: UnitOfWorkState::Open,
        }
    }

    pub(crate) fn non_transactional(session: SessionHandle<St::Session>, repositories: R) -> Self {
        Self {
            session,
            transaction: None,
            repositories,
            state: UnitOfWorkState::Open,
        }
    }

    pub fn state(&self) -> UnitOfWorkState {
        self.state
    }

    pub fn is_transactional(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.transaction
            .as_ref()
            .map(|transaction| transaction.outbox.request_id())
    }

    pub fn repositories(&self) -> &R {
        &self.repositories
    }

    pub fn repositories_mut(&mut self) -> &mut R {
        &mut self.repositories
    }

    /// The session shared with the business repositories.
    pub fn session(&self) -> &SessionHandle<St::Session> {
        &self.session
    }

    pub fn outbox(&self) -> Result<&Outbox, UnitOfWorkError> {
        self.transaction
            .as_ref()
            .map(|transaction| &transaction.outbox)
            .ok_or(UnitOfWorkError::NonTransactional { operation: "outbox" })
    }

    /// Mutable outbox access, only while the unit of work is open.
    pub fn outbox_mut(&mut self) -> Result<&mut Outbox, UnitOfWorkError> {
        let transaction = self
            .transaction
            .as_mut()
            .ok_or(UnitOfWorkError::NonTransactional { operation: "outbox" })?;
        if self.state != UnitOfWorkState::Open {
            return Err(UnitOfWorkError::InvalidState {
                operation: "modify the outbox of",
                state: self.state,
            });
        }
        Ok(&mut transaction.outbox)
    }

    /// Write the outbox as stored, then commit the transaction.
    ///
    /// The outbox row is written inside the transaction before it commits,
    /// not after: business data and the stored outbox become visible
    /// together or not at all. When another attempt with the same request
    /// id stored the outbox first, nothing is committed and the call fails
    /// with [`OutboxError::AlreadyStored`]; dispose the unit of work to roll
    /// back.
    #[instrument(skip(self), fields(request_id = self.request_id()))]
    pub async fn commit(&mut self) -> Result<(), UnitOfWorkError> {
        let transaction = self
            .transaction
            .as_mut()
            .ok_or(UnitOfWorkError::NonTransactional { operation: "commit" })?;
        if self.state != UnitOfWorkState::Open {
            return Err(UnitOfWorkError::InvalidState {
                operation: "commit",
                state: self.state,
            });
        }

        {
            let mut session = self.session.lock().await?;
            transaction
                .outbox_repository
                .save_with(&mut *session, &transaction.outbox, OutboxPersistingReason::Storing)
                .await?;
            transaction
                .outbox_repository
                .commit_stored(&mut *session, &transaction.outbox)
                .await
                .map_err(|error| match error {
                    OutboxError::Store(error) => UnitOfWorkError::Store(error),
                    error => UnitOfWorkError::Outbox(error),
                })?;
        }

        transaction.outbox.mark_stored();
        self.state = UnitOfWorkState::Committed;
        Ok(())
    }

    /// Roll the transaction back. Nothing recorded in the outbox survives.
    pub async fn rollback(&mut self) -> Result<(), UnitOfWorkError> {
        let transaction = self
            .transaction
            .as_mut()
            .ok_or(UnitOfWorkError::NonTransactional { operation: "rollback" })?;
        if self.state != UnitOfWorkState::Open {
            return Err(UnitOfWorkError::InvalidState {
                operation: "roll back",
                state: self.state,
            });
        }

        self.session.lock().await?.rollback().await?;

        if !transaction.outbox.is_stored() {
            transaction.outbox.discard();
        }
        self.state = UnitOfWorkState::RolledBack;
        Ok(())
    }

    /// Send every recorded command, publish every recorded event, then mark
    /// the outbox dispatched.
    ///
    /// Safe to call again after a failure. Returns without redelivering when
    /// the outbox is already dispatched.
    #[instrument(skip(self), fields(request_id = self.request_id()))]
    pub async fn ensure_outbox_dispatched(&mut self) -> Result<(), UnitOfWorkError> {
        let transaction = self.transaction.as_mut().ok_or(UnitOfWorkError::NonTransactional {
            operation: "dispatch",
        })?;
        if self.state == UnitOfWorkState::Disposed {
            return Err(UnitOfWorkError::InvalidState {
                operation: "dispatch",
                state: self.state,
            });
        }

        let outbox = &mut transaction.outbox;
        if outbox.is_dispatched() {
            debug!("outbox already dispatched");
            return Ok(());
        }
        if !outbox.is_stored() {
            return Err(UnitOfWorkError::OutboxNotStored {
                request_id: outbox.request_id().to_string(),
            });
        }

        for command in outbox.commands() {
            transaction.dispatcher.send(command.as_ref()).await?;
        }
        for event in outbox.events() {
            transaction.dispatcher.publish(event.as_ref()).await?;
        }

        transaction
            .outbox_repository
            .save(outbox, OutboxPersistingReason::Dispatching)
            .await?;
        outbox.mark_dispatched();
        Ok(())
    }

    /// Release the transaction and the session.
    ///
    /// An open transaction is rolled back. Failures are logged, never
    /// returned: a broken connection is still released.
    pub async fn dispose(&mut self) {
        if self.state == UnitOfWorkState::Disposed {
            return;
        }
        self.state = UnitOfWorkState::Disposed;

        let Some(mut session) = self.session.take().await else {
            return;
        };
        if session.in_transaction() {
            if let Err(error) = session.rollback().await {
                warn!(%error, "failed to roll back transaction on dispose");
            }
        }
        if let Err(error) = session.close().await {
            warn!(%error, "failed to close session on dispose");
        }
    }
}

impl<St: Store, R> Drop for UnitOfWork<St, R> {
    fn drop(&mut self) {
        if self.state == UnitOfWorkState::Disposed {
            return;
        }
        if let Some(session) = self.session.try_take() {
            debug!(state = ?self.state, "unit of work dropped without dispose");
            drop(session);
        }
    }
}
