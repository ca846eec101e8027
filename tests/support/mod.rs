#![allow(dead_code, unused_imports)]

mod entities;
mod messages;

use std::sync::Arc;

use idempotency_outbox::{
    EnvelopeCodec, Idempotency, IdempotencyOptions, InMemoryOutboxDispatcher, InMemoryStore,
};

pub use entities::{read_name, TestEntities};
pub use messages::{TestDomainCommand, TestDomainEvent, TestDomainResponse};

pub const SOME_SEQUENCE: &str = "some_sequence";
pub const STARTED_FROM_100_SEQUENCE: &str = "started_from_100_sequence";

pub struct Fixture {
    pub store: InMemoryStore,
    pub dispatcher: InMemoryOutboxDispatcher,
    pub idempotency: Idempotency<InMemoryStore, TestEntities>,
}

pub fn options() -> IdempotencyOptions {
    IdempotencyOptions::default()
        .add_id_generator(SOME_SEQUENCE, 1, 1)
        .unwrap()
        .add_id_generator(STARTED_FROM_100_SEQUENCE, 100, 10)
        .unwrap()
}

pub fn setup() -> Fixture {
    let options = options();
    let store = InMemoryStore::new();
    store.migrate(&options).unwrap();
    store.create_table(TestEntities::TABLE).unwrap();

    let dispatcher = InMemoryOutboxDispatcher::new();
    let codec = EnvelopeCodec::builder().types(messages::types()).build();

    let idempotency = Idempotency::builder(store.clone())
        .options(options)
        .dispatcher(Arc::new(dispatcher.clone()))
        .codec(codec)
        .repositories(|session| TestEntities::new(session.clone()))
        .build()
        .unwrap();

    Fixture {
        store,
        dispatcher,
        idempotency,
    }
}
