use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

use super::error::{StoreError, StoreResult};
use super::schema::{InsertOutcome, QualifiedName, Row, RowKey, TableSchema, UpdateOutcome};

/// A relational store: hands out one session (connection) per caller.
///
/// Implementations might include:
/// - `InMemoryStore` - for testing and single-process scenarios
/// - a Postgres store (`insert ... on conflict do nothing`, `nextval`)
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    type Session: Session;

    /// Open a new session. Sessions are never shared between requests.
    async fn connect(&self) -> StoreResult<Self::Session>;
}

/// One connection to the store.
///
/// Writes issued between `begin` and `commit` become visible to other
/// sessions atomically at commit and are discarded on rollback or when the
/// session is dropped. Outside a transaction every write commits on its own.
#[async_trait]
pub trait Session: Send + 'static {
    /// Schema used to qualify bare table and sequence names.
    async fn default_schema(&mut self) -> StoreResult<String>;

    async fn begin(&mut self) -> StoreResult<()>;

    async fn commit(&mut self) -> StoreResult<()>;

    async fn rollback(&mut self) -> StoreResult<()>;

    fn in_transaction(&self) -> bool;

    /// Insert a row. A duplicate primary key is reported as
    /// [`InsertOutcome::Conflict`], never overwritten.
    ///
    /// The row stays tracked by the session even when the insert conflicts;
    /// call [`Session::clear_tracked`] before reading the same key back.
    async fn insert(&mut self, table: &TableSchema, row: Row) -> StoreResult<InsertOutcome>;

    /// Replace an existing row.
    async fn update(&mut self, table: &TableSchema, row: Row) -> StoreResult<()>;

    /// Replace an existing row only while its `column` still holds
    /// `expected` (`update ... where column = expected`).
    ///
    /// Inside a transaction the condition holds until commit: a concurrent
    /// change to the row makes `commit` fail with
    /// [`StoreError::ConditionFailed`].
    async fn update_if(
        &mut self,
        table: &TableSchema,
        row: Row,
        column: &str,
        expected: &Value,
    ) -> StoreResult<UpdateOutcome>;

    /// Look a row up by primary key. Rows tracked by this session win.
    async fn find(&mut self, table: &TableSchema, key: &RowKey) -> StoreResult<Option<Row>>;

    /// Forget every row this session tracks for `table`.
    fn clear_tracked(&mut self, table: &TableSchema);

    /// Advance a named sequence. Not transactional: a rollback never returns
    /// the value.
    async fn next_value(&mut self, sequence: &QualifiedName) -> StoreResult<i64>;

    /// Release the connection. Must succeed even for a broken connection.
    async fn close(&mut self) -> StoreResult<()>;
}

/// Shared handle to one session.
///
/// A unit of work and the repositories provisioned for it hold clones of the
/// same handle. Once the unit of work releases the session every clone
/// fails with [`StoreError::SessionClosed`].
pub struct SessionHandle<S> {
    inner: Arc<Mutex<Option<S>>>,
}

impl<S> Clone for SessionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Session> SessionHandle<S> {
    pub fn new(session: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(session))),
        }
    }

    /// Lock the session for a sequence of operations.
    pub async fn lock(&self) -> StoreResult<SessionGuard<'_, S>> {
        let guard = self.inner.lock().await;
        if guard.is_none() {
            return Err(StoreError::SessionClosed);
        }
        Ok(SessionGuard(guard))
    }

    /// Take the session out of the handle, closing it for every clone.
    pub async fn take(&self) -> Option<S> {
        self.inner.lock().await.take()
    }

    /// Non-blocking [`SessionHandle::take`], for use from `Drop`.
    pub fn try_take(&self) -> Option<S> {
        self.inner.try_lock().ok().and_then(|mut guard| guard.take())
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}

/// Exclusive access to an open session.
pub struct SessionGuard<'a, S>(MutexGuard<'a, Option<S>>);

impl<S> Deref for SessionGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        match self.0.as_ref() {
            Some(session) => session,
            None => unreachable!("session guard is only built for an open session"),
        }
    }
}

impl<S> DerefMut for SessionGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        match self.0.as_mut() {
            Some(session) => session,
            None => unreachable!("session guard is only built for an open session"),
        }
    }
}
