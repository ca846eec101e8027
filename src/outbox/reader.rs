use crate::store::Store;

use super::error::OutboxError;
use super::outbox::Outbox;
use super::repository::OutboxRepository;

/// Read-only access to outbox records, for status queries outside a unit of
/// work.
pub struct OutboxReader<St: Store> {
    repository: OutboxRepository<St>,
}

impl<St: Store> Clone for OutboxReader<St> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

impl<St: Store> OutboxReader<St> {
    pub fn new(repository: OutboxRepository<St>) -> Self {
        Self { repository }
    }

    /// The outbox stored for `idempotency_id`, or `None` if no attempt
    /// opened one.
    pub async fn get_or_default(&self, idempotency_id: &str) -> Result<Option<Outbox>, OutboxError> {
        self.repository.find(idempotency_id).await
    }
}
