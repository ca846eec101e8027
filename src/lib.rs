mod config;
mod envelope;
mod id_generator;
mod idempotency;
mod outbox;
mod store;
mod unit_of_work;

pub use config::{ConfigError, IdGeneratorOptions, IdempotencyOptions, OutboxColumns, OutboxOptions};
pub use envelope::{
    builtin_types, AnyPayload, CodecError, Envelope, EnvelopeCodec, EnvelopeCodecBuilder, Payload,
    PayloadType, SourceSetId, TypeRegistry, TypeSource, TypesCache,
};
pub use id_generator::{IdGenerator, IdGeneratorError, IdGeneratorRepository};
pub use idempotency::{Idempotency, IdempotencyBuilder};
pub use outbox::{
    DispatchError, InMemoryOutboxDispatcher, LogDispatcher, OpenOutcome, Outbox, OutboxDispatcher,
    OutboxError, OutboxPersistingReason, OutboxReader, OutboxRepository,
};
#[cfg(feature = "in-memory")]
pub use store::{InMemorySession, InMemoryStore, StoreOperation};
pub use store::{
    InsertOutcome, QualifiedName, Row, RowKey, Session, SessionGuard, SessionHandle, Store,
    StoreError, StoreResult, TableSchema, UpdateOutcome,
};
pub use unit_of_work::{
    Provisioner, UnitOfWork, UnitOfWorkError, UnitOfWorkFactory, UnitOfWorkManager,
    UnitOfWorkState,
};
