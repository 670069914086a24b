//! The queue service client interface consumed by registered queues.

use crate::error::QueueError;
use crate::message::{MessageClass, MessageId, OutboundMessage, ReceivedMessage};
use crate::naming::QueueName;
use async_trait::async_trait;
use std::time::Duration;

/// Binding to a remote queue returned by [`QueueServiceClient::create_or_get_queue`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    name: QueueName,
    locator: String,
    visibility_timeout: Duration,
}

impl QueueHandle {
    pub fn new(name: QueueName, locator: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            name,
            locator: locator.into(),
            visibility_timeout,
        }
    }

    /// Full (wire) name of the queue
    pub fn name(&self) -> &QueueName {
        &self.name
    }

    /// Service-specific address of the queue, e.g. an SQS queue URL
    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn visibility_timeout(&self) -> Duration {
        self.visibility_timeout
    }
}

/// Network operations against a managed message-queue service.
///
/// Implementations own transport, authentication and wire encoding. None of
/// the operations retry; failures are returned to the caller.
#[async_trait]
pub trait QueueServiceClient: Send + Sync {
    /// Create the queue if missing and return a handle to it
    async fn create_or_get_queue(
        &self,
        full_name: &QueueName,
        visibility_timeout: Duration,
    ) -> Result<QueueHandle, QueueError>;

    /// Declare the message class fetched messages are decoded into
    async fn set_message_type(
        &self,
        handle: &QueueHandle,
        message_class: &MessageClass,
    ) -> Result<(), QueueError>;

    /// Enqueue one message
    async fn write_message(
        &self,
        handle: &QueueHandle,
        message: OutboundMessage,
    ) -> Result<MessageId, QueueError>;

    /// Fetch up to `max_count` messages, in service order
    async fn fetch_messages(
        &self,
        handle: &QueueHandle,
        max_count: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Acknowledge a fetched message by deleting it
    async fn delete_message(
        &self,
        handle: &QueueHandle,
        message: &ReceivedMessage,
    ) -> Result<(), QueueError>;

    /// Short service name used in logs
    fn service_name(&self) -> &'static str;
}
