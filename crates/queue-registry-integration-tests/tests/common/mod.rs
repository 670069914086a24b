//! Common test utilities for queue-registry integration tests
//!
//! This module provides:
//! - A recording receiver with scripted failures
//! - A queue service wrapper that fails selected deletes
//! - Registry and message builders

use async_trait::async_trait;
use bytes::Bytes;
use queue_registry::{
    Attributes, HandlerError, InMemoryQueueService, Message, MessageClass, MessageId,
    OutboundMessage, QueueError, QueueHandle, QueueMessage, QueueName, QueueRegistry,
    QueueServiceClient, ReceivedMessage, Receiver, RegistrySettings, SerializationError,
};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Registry Builders
// ============================================================================

#[allow(dead_code)]
pub fn memory_registry(settings: RegistrySettings) -> (InMemoryQueueService, QueueRegistry) {
    let service = InMemoryQueueService::new();
    let registry = QueueRegistry::new(Arc::new(service.clone()), settings).unwrap();
    (service, registry)
}

#[allow(dead_code)]
pub fn text(message: &Message) -> String {
    String::from_utf8_lossy(&message.body).into_owned()
}

// ============================================================================
// Recording Receiver
// ============================================================================

/// Receiver recording every body it sees and failing on selected bodies
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct RecordingReceiver {
    seen: Arc<Mutex<Vec<String>>>,
    fail_on: Arc<HashSet<String>>,
}

impl RecordingReceiver {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn failing_on(bodies: &[&str]) -> Self {
        Self {
            seen: Arc::default(),
            fail_on: Arc::new(bodies.iter().map(|b| b.to_string()).collect()),
        }
    }

    #[allow(dead_code)]
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Receiver<Message> for RecordingReceiver {
    async fn receive(&self, message: &Message) -> Result<Value, HandlerError> {
        let body = text(message);
        self.seen.lock().unwrap().push(body.clone());

        if self.fail_on.contains(&body) {
            return Err(HandlerError::failed(format!("refusing {}", body)));
        }
        Ok(Value::String(body))
    }
}

// ============================================================================
// Flaky Queue Service
// ============================================================================

/// In-memory service whose deletes fail for selected message bodies
#[allow(dead_code)]
#[derive(Clone)]
pub struct FlakyDeleteService {
    inner: InMemoryQueueService,
    failing_bodies: Arc<HashSet<String>>,
}

impl FlakyDeleteService {
    #[allow(dead_code)]
    pub fn new(inner: InMemoryQueueService, failing_bodies: &[&str]) -> Self {
        Self {
            inner,
            failing_bodies: Arc::new(failing_bodies.iter().map(|b| b.to_string()).collect()),
        }
    }
}

#[async_trait]
impl QueueServiceClient for FlakyDeleteService {
    async fn create_or_get_queue(
        &self,
        full_name: &QueueName,
        visibility_timeout: Duration,
    ) -> Result<QueueHandle, QueueError> {
        self.inner
            .create_or_get_queue(full_name, visibility_timeout)
            .await
    }

    async fn set_message_type(
        &self,
        handle: &QueueHandle,
        message_class: &MessageClass,
    ) -> Result<(), QueueError> {
        self.inner.set_message_type(handle, message_class).await
    }

    async fn write_message(
        &self,
        handle: &QueueHandle,
        message: OutboundMessage,
    ) -> Result<MessageId, QueueError> {
        self.inner.write_message(handle, message).await
    }

    async fn fetch_messages(
        &self,
        handle: &QueueHandle,
        max_count: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.inner.fetch_messages(handle, max_count).await
    }

    async fn delete_message(
        &self,
        handle: &QueueHandle,
        message: &ReceivedMessage,
    ) -> Result<(), QueueError> {
        let body = String::from_utf8_lossy(&message.body).into_owned();
        if self.failing_bodies.contains(&body) {
            return Err(QueueError::ConnectionFailed {
                message: format!("delete of '{}' dropped", body),
            });
        }
        self.inner.delete_message(handle, message).await
    }

    fn service_name(&self) -> &'static str {
        "flaky-delete"
    }
}

// ============================================================================
// Message Classes
// ============================================================================

/// Message class whose body must be a JSON object
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct JsonEvent {
    pub attributes: Attributes,
    pub body: Bytes,
    pub payload: Value,
}

impl QueueMessage for JsonEvent {
    const MESSAGE_TYPE: &'static str = "json-event";

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn body(&self) -> &Bytes {
        &self.body
    }

    fn from_parts(attributes: Attributes, body: Bytes) -> Result<Self, SerializationError> {
        let payload: Value = serde_json::from_slice(&body)?;
        if !payload.is_object() {
            return Err(SerializationError::InvalidAttribute {
                key: "body".to_string(),
            });
        }
        Ok(Self {
            attributes,
            body,
            payload,
        })
    }
}

/// Message class with a tag the queue service cannot carry
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct BadlyTagged {
    pub attributes: Attributes,
    pub body: Bytes,
}

impl QueueMessage for BadlyTagged {
    const MESSAGE_TYPE: &'static str = "not a valid tag!";

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn body(&self) -> &Bytes {
        &self.body
    }

    fn from_parts(attributes: Attributes, body: Bytes) -> Result<Self, SerializationError> {
        Ok(Self { attributes, body })
    }
}
