use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::envelope::{AnyPayload, Payload};

/// Error type for dispatch operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The transport could not be reached.
    #[error("dispatcher unavailable: {0}")]
    Unavailable(String),

    /// The transport refused the message.
    #[error("message rejected: {0}")]
    Rejected(String),

    #[error("{0}")]
    Other(Box<dyn Error + Send + Sync>),
}

/// Hands recorded commands and events to the messaging transport.
///
/// Both calls may see a payload that was already delivered by an earlier,
/// partially failed dispatch. Implementations must tolerate that.
#[async_trait]
pub trait OutboxDispatcher: Send + Sync {
    async fn send(&self, command: &dyn AnyPayload) -> Result<(), DispatchError>;

    async fn publish(&self, event: &dyn AnyPayload) -> Result<(), DispatchError>;
}

#[derive(Debug, Default)]
struct Delivered {
    sent: Vec<Box<dyn AnyPayload>>,
    published: Vec<Box<dyn AnyPayload>>,
    failures: usize,
}

/// Dispatcher that records every delivery in memory.
///
/// ```ignore
/// let dispatcher = InMemoryOutboxDispatcher::new();
/// // ... commit and dispatch a unit of work ...
/// assert_eq!(dispatcher.published::<OrderPlaced>().len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryOutboxDispatcher {
    delivered: Arc<Mutex<Delivered>>,
}

impl InMemoryOutboxDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sent commands of type `T`, in delivery order.
    pub fn sent<T: Payload>(&self) -> Vec<T> {
        self.delivered
            .lock()
            .map(|delivered| collect(&delivered.sent))
            .unwrap_or_default()
    }

    /// Published events of type `T`, in delivery order.
    pub fn published<T: Payload>(&self) -> Vec<T> {
        self.delivered
            .lock()
            .map(|delivered| collect(&delivered.published))
            .unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.delivered
            .lock()
            .map(|delivered| delivered.sent.len())
            .unwrap_or_default()
    }

    pub fn published_count(&self) -> usize {
        self.delivered
            .lock()
            .map(|delivered| delivered.published.len())
            .unwrap_or_default()
    }

    /// Make the next `count` deliveries fail with [`DispatchError::Unavailable`].
    pub fn fail_next(&self, count: usize) {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.failures = count;
        }
    }

    pub fn clear(&self) {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.sent.clear();
            delivered.published.clear();
        }
    }

    fn delivered(&self) -> Result<MutexGuard<'_, Delivered>, DispatchError> {
        let mut delivered = self
            .delivered
            .lock()
            .map_err(|_| DispatchError::Unavailable("dispatcher lock poisoned".into()))?;
        if delivered.failures > 0 {
            delivered.failures -= 1;
            return Err(DispatchError::Unavailable("injected failure".into()));
        }
        Ok(delivered)
    }
}

fn collect<T: Payload>(payloads: &[Box<dyn AnyPayload>]) -> Vec<T> {
    payloads
        .iter()
        .filter_map(|payload| payload.downcast_ref::<T>().cloned())
        .collect()
}

#[async_trait]
impl OutboxDispatcher for InMemoryOutboxDispatcher {
    async fn send(&self, command: &dyn AnyPayload) -> Result<(), DispatchError> {
        self.delivered()?.sent.push(command.clone_payload());
        Ok(())
    }

    async fn publish(&self, event: &dyn AnyPayload) -> Result<(), DispatchError> {
        self.delivered()?.published.push(event.clone_payload());
        Ok(())
    }
}

/// A simple dispatcher that logs deliveries through `tracing`, or into a
/// buffer.
#[derive(Clone, Debug, Default)]
pub struct LogDispatcher {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl LogDispatcher {
    pub fn new() -> Self {
        LogDispatcher { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        LogDispatcher {
            buffer: Some(buffer),
        }
    }

    fn log(&self, kind: &str, payload: &dyn AnyPayload) -> Result<(), DispatchError> {
        let body = payload
            .to_body()
            .map_err(|e| DispatchError::Other(Box::new(e)))?;
        match &self.buffer {
            Some(buffer) => {
                let mut buffer = buffer
                    .lock()
                    .map_err(|_| DispatchError::Unavailable("log buffer poisoned".into()))?;
                buffer.push(format!("[{}] {} {}", kind, payload.tag(), body));
            }
            None => info!(kind, type_tag = payload.tag(), %body, "outbox delivery"),
        }
        Ok(())
    }
}

#[async_trait]
impl OutboxDispatcher for LogDispatcher {
    async fn send(&self, command: &dyn AnyPayload) -> Result<(), DispatchError> {
        self.log("SEND", command)
    }

    async fn publish(&self, event: &dyn AnyPayload) -> Result<(), DispatchError> {
        self.log("PUBLISH", event)
    }
}
