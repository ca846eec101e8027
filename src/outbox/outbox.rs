use std::any::type_name;

use crate::envelope::{AnyPayload, Payload};

use super::error::OutboxError;

/// The side effects of one request: a response, events to publish and
/// commands to send, plus how far the request has progressed.
///
/// `is_stored` and `is_dispatched` only ever go from `false` to `true`.
#[derive(Clone, Debug)]
pub struct Outbox {
    request_id: String,
    aggregate_id: i64,
    is_stored: bool,
    is_dispatched: bool,
    response: Option<Box<dyn AnyPayload>>,
    events: Vec<Box<dyn AnyPayload>>,
    commands: Vec<Box<dyn AnyPayload>>,
}

impl Outbox {
    /// A fresh, empty outbox.
    pub fn new(request_id: impl Into<String>, aggregate_id: i64) -> Self {
        Self {
            request_id: request_id.into(),
            aggregate_id,
            is_stored: false,
            is_dispatched: false,
            response: None,
            events: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Rebuild an outbox from its stored record.
    pub fn restore(
        request_id: impl Into<String>,
        aggregate_id: i64,
        is_stored: bool,
        is_dispatched: bool,
        response: Option<Box<dyn AnyPayload>>,
        events: Vec<Box<dyn AnyPayload>>,
        commands: Vec<Box<dyn AnyPayload>>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            aggregate_id,
            is_stored,
            is_dispatched,
            response,
            events,
            commands,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn aggregate_id(&self) -> i64 {
        self.aggregate_id
    }

    /// True when an earlier attempt already stored this outbox. Business
    /// logic must not run again; the caller should only ensure dispatch.
    pub fn is_closed(&self) -> bool {
        self.is_stored
    }

    pub fn is_stored(&self) -> bool {
        self.is_stored
    }

    pub fn is_dispatched(&self) -> bool {
        self.is_dispatched
    }

    pub fn publish<T: Payload>(&mut self, event: T) -> Result<(), OutboxError> {
        self.ensure_open()?;
        self.events.push(Box::new(event));
        Ok(())
    }

    pub fn send<T: Payload>(&mut self, command: T) -> Result<(), OutboxError> {
        self.ensure_open()?;
        self.commands.push(Box::new(command));
        Ok(())
    }

    /// Set the response returned to this request and to every duplicate of it.
    pub fn return_response<T: Payload>(&mut self, response: T) -> Result<(), OutboxError> {
        self.ensure_open()?;
        if self.response.is_some() {
            return Err(OutboxError::ResponseAlreadySet {
                request_id: self.request_id.clone(),
            });
        }
        self.response = Some(Box::new(response));
        Ok(())
    }

    /// The response, if one was returned.
    pub fn response<T: Payload>(&self) -> Result<Option<&T>, OutboxError> {
        let Some(response) = self.response.as_deref() else {
            return Ok(None);
        };
        response
            .downcast_ref::<T>()
            .map(Some)
            .ok_or_else(|| OutboxError::ResponseTypeMismatch {
                request_id: self.request_id.clone(),
                expected: type_name::<T>(),
                actual: response.tag(),
            })
    }

    pub fn response_payload(&self) -> Option<&dyn AnyPayload> {
        self.response.as_deref()
    }

    pub fn events(&self) -> &[Box<dyn AnyPayload>] {
        &self.events
    }

    pub fn commands(&self) -> &[Box<dyn AnyPayload>] {
        &self.commands
    }

    pub(crate) fn mark_stored(&mut self) {
        self.is_stored = true;
    }

    pub(crate) fn mark_dispatched(&mut self) {
        self.is_dispatched = true;
    }

    /// Drop everything recorded since the outbox was opened.
    pub(crate) fn discard(&mut self) {
        self.response = None;
        self.events.clear();
        self.commands.clear();
    }

    fn ensure_open(&self) -> Result<(), OutboxError> {
        if self.is_closed() {
            return Err(OutboxError::Closed {
                request_id: self.request_id.clone(),
            });
        }
        Ok(())
    }
}
