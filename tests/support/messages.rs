use idempotency_outbox::{payload, TypeRegistry};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestDomainEvent {
    pub id: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestDomainCommand {
    pub id: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestDomainResponse {
    pub id: i64,
}

payload!(TestDomainEvent => "tests.TestDomainEvent");
payload!(TestDomainCommand => "tests.TestDomainCommand");
payload!(TestDomainResponse => "tests.TestDomainResponse");

pub fn types() -> TypeRegistry {
    TypeRegistry::new("tests")
        .register::<TestDomainEvent>()
        .register::<TestDomainCommand>()
        .register::<TestDomainResponse>()
}
