//! InMemoryStore - HashMap-backed relational store for testing and development.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::IdempotencyOptions;

use super::error::{StoreError, StoreResult};
use super::schema::{InsertOutcome, QualifiedName, Row, RowKey, TableSchema, UpdateOutcome};
use super::session::{Session, Store};

/// Store operations that can be made to fail with [`InMemoryStore::fail_next`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOperation {
    Connect,
    Begin,
    Commit,
    Rollback,
    Insert,
    Update,
    Find,
    NextValue,
}

struct Sequence {
    next: i64,
    increment: i64,
}

#[derive(Default)]
struct StoreState {
    tables: HashMap<QualifiedName, HashMap<RowKey, Row>>,
    sequences: HashMap<QualifiedName, Sequence>,
    faults: Vec<StoreOperation>,
    open_sessions: usize,
}

/// In-memory store backed by HashMaps.
///
/// Tables and sequences must be created up front (see [`InMemoryStore::migrate`]).
/// Clone-friendly via Arc; every clone sees the same data.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
    default_schema: Arc<str>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub const DEFAULT_SCHEMA: &'static str = "public";

    pub fn new() -> Self {
        Self::with_default_schema(Self::DEFAULT_SCHEMA)
    }

    pub fn with_default_schema(schema: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            default_schema: Arc::from(schema.into()),
        }
    }

    pub fn default_schema(&self) -> &str {
        &self.default_schema
    }

    fn state(&self, operation: &'static str) -> StoreResult<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::LockPoisoned(operation))
    }

    fn qualify(&self, name: &str) -> QualifiedName {
        QualifiedName::resolve(name, &self.default_schema)
    }

    /// Create a table. Creating an existing table is a no-op.
    pub fn create_table(&self, name: &str) -> StoreResult<()> {
        let name = self.qualify(name);
        self.state("create table")?.tables.entry(name).or_default();
        Ok(())
    }

    /// Create a sequence. Creating an existing sequence keeps its position.
    pub fn create_sequence(&self, name: &str, start: i64, increment: i64) -> StoreResult<()> {
        let name = self.qualify(name);
        self.state("create sequence")?
            .sequences
            .entry(name)
            .or_insert(Sequence {
                next: start,
                increment,
            });
        Ok(())
    }

    /// Create the outbox table, the id generator table and every configured
    /// sequence.
    pub fn migrate(&self, options: &IdempotencyOptions) -> StoreResult<()> {
        self.create_table(&options.outbox.table_name)?;
        self.create_table(&options.id_generator_table_name)?;
        for generator in &options.id_generators {
            self.create_sequence(
                &generator.sequence_name,
                generator.start_number,
                i64::from(generator.increment_size),
            )?;
        }
        self.create_sequence(
            &options.outbox.aggregate_id_generator,
            options.outbox.start_aggregate_id_from,
            1,
        )
    }

    /// Make the next matching operation fail as if the connection dropped.
    /// The failing session stays broken until it is closed.
    pub fn fail_next(&self, operation: StoreOperation) {
        if let Ok(mut state) = self.state.lock() {
            state.faults.push(operation);
        }
    }

    /// Number of sessions that have been connected and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.open_sessions)
            .unwrap_or_default()
    }

    /// Committed rows of a table.
    pub fn rows(&self, table: &str) -> StoreResult<Vec<Row>> {
        let name = self.qualify(table);
        let state = self.state("rows")?;
        let rows = state
            .tables
            .get(&name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))?;
        Ok(rows.values().cloned().collect())
    }

    fn take_fault(&self, operation: StoreOperation) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        match state.faults.iter().position(|f| *f == operation) {
            Some(index) => {
                state.faults.remove(index);
                true
            }
            None => false,
        }
    }

    fn release(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.open_sessions = state.open_sessions.saturating_sub(1);
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Session = InMemorySession;

    async fn connect(&self) -> StoreResult<InMemorySession> {
        if self.take_fault(StoreOperation::Connect) {
            return Err(StoreError::Connection("injected failure during Connect".into()));
        }
        self.state("connect")?.open_sessions += 1;
        Ok(InMemorySession {
            store: self.clone(),
            transaction: None,
            tracked: HashMap::new(),
            broken: false,
            closed: false,
        })
    }
}

enum PendingWrite {
    Insert(Row),
    Update(Row),
    UpdateIf {
        row: Row,
        column: String,
        expected: Value,
    },
}

impl PendingWrite {
    fn row(&self) -> &Row {
        match self {
            PendingWrite::Insert(row) | PendingWrite::Update(row) => row,
            PendingWrite::UpdateIf { row, .. } => row,
        }
    }

    fn into_row(self) -> Row {
        match self {
            PendingWrite::Insert(row) | PendingWrite::Update(row) => row,
            PendingWrite::UpdateIf { row, .. } => row,
        }
    }
}

/// Session of an [`InMemoryStore`].
///
/// Transactional writes are buffered per session and applied under one lock
/// at commit. Rows passed to `insert`/`update` are tracked by the session
/// and win over stored rows on `find`.
pub struct InMemorySession {
    store: InMemoryStore,
    transaction: Option<Vec<(QualifiedName, RowKey, PendingWrite)>>,
    tracked: HashMap<(QualifiedName, RowKey), Row>,
    broken: bool,
    closed: bool,
}

impl InMemorySession {
    fn check(&mut self, operation: StoreOperation) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::SessionClosed);
        }
        if self.broken {
            return Err(StoreError::Connection("connection is broken".into()));
        }
        if self.store.take_fault(operation) {
            self.broken = true;
            return Err(StoreError::Connection(format!(
                "injected failure during {:?}",
                operation
            )));
        }
        Ok(())
    }

    fn buffered(&self, table: &QualifiedName, key: &RowKey) -> Option<&Row> {
        self.transaction.as_ref().and_then(|writes| {
            writes
                .iter()
                .rev()
                .find(|(t, k, _)| t == table && k == key)
                .map(|(_, _, write)| write.row())
        })
    }
}

#[async_trait]
impl Session for InMemorySession {
    async fn default_schema(&mut self) -> StoreResult<String> {
        if self.closed {
            return Err(StoreError::SessionClosed);
        }
        Ok(self.store.default_schema.to_string())
    }

    async fn begin(&mut self) -> StoreResult<()> {
        self.check(StoreOperation::Begin)?;
        if self.transaction.is_some() {
            return Err(StoreError::TransactionInProgress);
        }
        self.transaction = Some(Vec::new());
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.check(StoreOperation::Commit)?;
        let writes = self.transaction.take().ok_or(StoreError::NoTransaction)?;

        let mut state = self.store.state("commit")?;
        // Row each key will hold once the writes before it are applied.
        let mut written: HashMap<(&QualifiedName, &RowKey), &Row> = HashMap::new();
        for (table, key, write) in &writes {
            let rows = state
                .tables
                .get(table)
                .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
            let current = written.get(&(table, key)).copied().or_else(|| rows.get(key));
            let failure = match write {
                PendingWrite::Insert(_) if current.is_some() => Some(StoreError::UniqueViolation {
                    table: table.to_string(),
                    key: key.to_string(),
                }),
                PendingWrite::Update(_) | PendingWrite::UpdateIf { .. } if current.is_none() => {
                    Some(StoreError::RowNotFound {
                        table: table.to_string(),
                        key: key.to_string(),
                    })
                }
                PendingWrite::UpdateIf {
                    column, expected, ..
                } if current.and_then(|row| row.get(column)) != Some(expected) => {
                    Some(StoreError::ConditionFailed {
                        table: table.to_string(),
                        key: key.to_string(),
                    })
                }
                _ => None,
            };
            if let Some(error) = failure {
                self.tracked.clear();
                return Err(error);
            }
            written.insert((table, key), write.row());
        }
        drop(written);

        for (table, key, write) in writes {
            if let Some(rows) = state.tables.get_mut(&table) {
                rows.insert(key, write.into_row());
            }
        }
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.check(StoreOperation::Rollback)?;
        self.transaction.take().ok_or(StoreError::NoTransaction)?;
        self.tracked.clear();
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    async fn insert(&mut self, table: &TableSchema, row: Row) -> StoreResult<InsertOutcome> {
        self.check(StoreOperation::Insert)?;
        let name = table.name().clone();
        let key = table.key_of(&row)?;
        self.tracked.insert((name.clone(), key.clone()), row.clone());

        let exists_in_buffer = self.buffered(&name, &key).is_some();
        let mut state = self.store.state("insert")?;
        let rows = state
            .tables
            .get_mut(&name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))?;
        if exists_in_buffer || rows.contains_key(&key) {
            return Ok(InsertOutcome::Conflict);
        }

        match self.transaction.as_mut() {
            Some(writes) => writes.push((name, key, PendingWrite::Insert(row))),
            None => {
                rows.insert(key, row);
            }
        }
        Ok(InsertOutcome::Inserted)
    }

    async fn update(&mut self, table: &TableSchema, row: Row) -> StoreResult<()> {
        self.check(StoreOperation::Update)?;
        let name = table.name().clone();
        let key = table.key_of(&row)?;

        let exists_in_buffer = self.buffered(&name, &key).is_some();
        let mut state = self.store.state("update")?;
        let rows = state
            .tables
            .get_mut(&name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))?;
        if !exists_in_buffer && !rows.contains_key(&key) {
            return Err(StoreError::RowNotFound {
                table: name.to_string(),
                key: key.to_string(),
            });
        }

        match self.transaction.as_mut() {
            Some(writes) => writes.push((name.clone(), key.clone(), PendingWrite::Update(row.clone()))),
            None => {
                rows.insert(key.clone(), row.clone());
            }
        }
        drop(state);
        self.tracked.insert((name, key), row);
        Ok(())
    }

    async fn update_if(
        &mut self,
        table: &TableSchema,
        row: Row,
        column: &str,
        expected: &Value,
    ) -> StoreResult<UpdateOutcome> {
        self.check(StoreOperation::Update)?;
        let name = table.name().clone();
        let key = table.key_of(&row)?;

        let buffered = self.buffered(&name, &key).cloned();
        let mut state = self.store.state("update")?;
        let rows = state
            .tables
            .get_mut(&name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))?;
        let Some(current) = buffered.as_ref().or_else(|| rows.get(&key)) else {
            return Err(StoreError::RowNotFound {
                table: name.to_string(),
                key: key.to_string(),
            });
        };
        if current.get(column) != Some(expected) {
            return Ok(UpdateOutcome::ConditionFailed);
        }

        match self.transaction.as_mut() {
            Some(writes) => writes.push((
                name.clone(),
                key.clone(),
                PendingWrite::UpdateIf {
                    row: row.clone(),
                    column: column.to_string(),
                    expected: expected.clone(),
                },
            )),
            None => {
                rows.insert(key.clone(), row.clone());
            }
        }
        drop(state);
        self.tracked.insert((name, key), row);
        Ok(UpdateOutcome::Updated)
    }

    async fn find(&mut self, table: &TableSchema, key: &RowKey) -> StoreResult<Option<Row>> {
        self.check(StoreOperation::Find)?;
        let name = table.name();
        if let Some(row) = self.tracked.get(&(name.clone(), key.clone())) {
            return Ok(Some(row.clone()));
        }
        if let Some(row) = self.buffered(name, key) {
            return Ok(Some(row.clone()));
        }

        let state = self.store.state("find")?;
        let rows = state
            .tables
            .get(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))?;
        Ok(rows.get(key).cloned())
    }

    fn clear_tracked(&mut self, table: &TableSchema) {
        self.tracked.retain(|(name, _), _| name != table.name());
    }

    async fn next_value(&mut self, name: &QualifiedName) -> StoreResult<i64> {
        self.check(StoreOperation::NextValue)?;
        let mut state = self.store.state("next value")?;
        let sequence = state
            .sequences
            .get_mut(name)
            .ok_or_else(|| StoreError::SequenceNotFound(name.to_string()))?;
        let value = sequence.next;
        sequence.next = value
            .checked_add(sequence.increment)
            .ok_or_else(|| StoreError::SequenceExhausted(name.to_string()))?;
        Ok(value)
    }

    async fn close(&mut self) -> StoreResult<()> {
        if !self.closed {
            self.closed = true;
            self.transaction = None;
            self.tracked.clear();
            self.store.release();
        }
        Ok(())
    }
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.store.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (InMemoryStore, TableSchema) {
        let store = InMemoryStore::with_default_schema("tests");
        store.create_table("entities").unwrap();
        let table = TableSchema::new(QualifiedName::new("tests", "entities"), ["id"]);
        (store, table)
    }

    fn row(id: i64, name: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), json!(id));
        row.insert("name".into(), json!(name));
        row
    }

    #[tokio::test]
    async fn autocommit_insert_is_visible_to_other_sessions() {
        let (store, table) = store();
        let mut writer = store.connect().await.unwrap();
        let mut reader = store.connect().await.unwrap();

        assert_eq!(
            writer.insert(&table, row(1, "one")).await.unwrap(),
            InsertOutcome::Inserted
        );

        let found = reader.find(&table, &RowKey::single(1)).await.unwrap();
        assert_eq!(found, Some(row(1, "one")));
    }

    #[tokio::test]
    async fn transactional_writes_are_invisible_until_commit() {
        let (store, table) = store();
        let mut writer = store.connect().await.unwrap();
        let mut reader = store.connect().await.unwrap();

        writer.begin().await.unwrap();
        writer.insert(&table, row(1, "one")).await.unwrap();
        assert_eq!(reader.find(&table, &RowKey::single(1)).await.unwrap(), None);

        writer.commit().await.unwrap();
        assert!(reader.find(&table, &RowKey::single(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rollback_discards_buffered_writes() {
        let (store, table) = store();
        let mut session = store.connect().await.unwrap();

        session.begin().await.unwrap();
        session.insert(&table, row(1, "one")).await.unwrap();
        session.rollback().await.unwrap();

        assert_eq!(session.find(&table, &RowKey::single(1)).await.unwrap(), None);
        assert!(store.rows("entities").unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts_and_leaves_tracked_row() {
        let (store, table) = store();
        let mut first = store.connect().await.unwrap();
        first.insert(&table, row(1, "original")).await.unwrap();

        let mut second = store.connect().await.unwrap();
        assert_eq!(
            second.insert(&table, row(1, "duplicate")).await.unwrap(),
            InsertOutcome::Conflict
        );

        let stale = second.find(&table, &RowKey::single(1)).await.unwrap();
        assert_eq!(stale, Some(row(1, "duplicate")));

        second.clear_tracked(&table);
        let fresh = second.find(&table, &RowKey::single(1)).await.unwrap();
        assert_eq!(fresh, Some(row(1, "original")));
    }

    #[tokio::test]
    async fn concurrent_commit_of_same_key_violates_uniqueness() {
        let (store, table) = store();
        let mut a = store.connect().await.unwrap();
        let mut b = store.connect().await.unwrap();

        a.begin().await.unwrap();
        b.begin().await.unwrap();
        a.insert(&table, row(1, "a")).await.unwrap();
        b.insert(&table, row(1, "b")).await.unwrap();

        a.commit().await.unwrap();
        let err = b.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
        assert_eq!(store.rows("entities").unwrap(), vec![row(1, "a")]);
    }

    #[tokio::test]
    async fn conditional_update_checks_the_current_row() {
        let (store, table) = store();
        let mut session = store.connect().await.unwrap();
        session.insert(&table, row(1, "one")).await.unwrap();

        let outcome = session
            .update_if(&table, row(1, "two"), "name", &json!("other"))
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::ConditionFailed);

        let outcome = session
            .update_if(&table, row(1, "two"), "name", &json!("one"))
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated);
        assert_eq!(store.rows("entities").unwrap(), vec![row(1, "two")]);
    }

    #[tokio::test]
    async fn conditional_update_is_rechecked_at_commit() {
        let (store, table) = store();
        let mut setup = store.connect().await.unwrap();
        setup.insert(&table, row(1, "open")).await.unwrap();

        let mut a = store.connect().await.unwrap();
        let mut b = store.connect().await.unwrap();
        a.begin().await.unwrap();
        b.begin().await.unwrap();
        for (session, name) in [(&mut a, "a"), (&mut b, "b")] {
            let outcome = session
                .update_if(&table, row(1, name), "name", &json!("open"))
                .await
                .unwrap();
            assert_eq!(outcome, UpdateOutcome::Updated);
        }

        a.commit().await.unwrap();
        let err = b.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed { .. }));
        assert!(!b.in_transaction());
        assert_eq!(store.rows("entities").unwrap(), vec![row(1, "a")]);
    }

    #[tokio::test]
    async fn exhausted_sequence_is_an_error() {
        let store = InMemoryStore::with_default_schema("tests");
        store.create_sequence("seq", i64::MAX - 1, 1).unwrap();
        let name = QualifiedName::new("tests", "seq");

        let mut session = store.connect().await.unwrap();
        assert_eq!(session.next_value(&name).await.unwrap(), i64::MAX - 1);
        let err = session.next_value(&name).await.unwrap_err();
        assert_eq!(err, StoreError::SequenceExhausted("tests.seq".into()));
    }

    #[tokio::test]
    async fn sequences_advance_outside_transactions() {
        let store = InMemoryStore::with_default_schema("tests");
        store.create_sequence("seq", 100, 10).unwrap();
        let name = QualifiedName::new("tests", "seq");

        let mut session = store.connect().await.unwrap();
        session.begin().await.unwrap();
        assert_eq!(session.next_value(&name).await.unwrap(), 100);
        session.rollback().await.unwrap();
        assert_eq!(session.next_value(&name).await.unwrap(), 110);
    }

    #[tokio::test]
    async fn injected_failure_breaks_the_session_but_close_still_releases() {
        let (store, table) = store();
        let mut session = store.connect().await.unwrap();
        assert_eq!(store.open_sessions(), 1);

        store.fail_next(StoreOperation::Insert);
        let err = session.insert(&table, row(1, "one")).await.unwrap_err();
        assert!(err.is_transient());
        assert!(session.find(&table, &RowKey::single(1)).await.is_err());

        session.close().await.unwrap();
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn dropping_a_session_releases_it() {
        let (store, _) = store();
        let session = store.connect().await.unwrap();
        assert_eq!(store.open_sessions(), 1);
        drop(session);
        assert_eq!(store.open_sessions(), 0);
    }
}
