//! In-memory queue service for testing and development.
//!
//! This module provides a queue service that behaves like a managed
//! message-queue service:
//! - Queues are created on demand and keep their first visibility timeout
//! - Fetched messages stay hidden until deleted or until their visibility
//!   timeout lapses, after which they are delivered again
//! - Delivery counts increase on every fetch
//!
//! Visibility is tracked with [`tokio::time::Instant`], so tests running on a
//! paused clock can step through redelivery deterministically. Every call is
//! recorded in an operation log for inspection.

use crate::client::{QueueHandle, QueueServiceClient};
use crate::error::QueueError;
use crate::message::{
    Attributes, MessageClass, MessageId, OutboundMessage, ReceiptHandle, ReceivedMessage,
    Timestamp,
};
use crate::naming::QueueName;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Shared state behind every clone of the service
#[derive(Default)]
struct ServiceStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
    calls: Vec<ServiceCall>,
    fetch_failures: VecDeque<QueueError>,
    next_sequence: u64,
}

/// Internal state for a single queue
struct InMemoryQueue {
    visibility_timeout: Duration,
    message_class: Option<MessageClass>,
    /// Visible messages in enqueue order
    messages: VecDeque<StoredMessage>,
    /// Fetched messages keyed by receipt handle
    in_flight: HashMap<String, InFlightMessage>,
}

impl InMemoryQueue {
    fn new(visibility_timeout: Duration) -> Self {
        Self {
            visibility_timeout,
            message_class: None,
            messages: VecDeque::new(),
            in_flight: HashMap::new(),
        }
    }

    /// Return in-flight messages whose visibility timeout lapsed
    fn release_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, m)| now >= m.visible_at)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        if expired.is_empty() {
            return;
        }

        for receipt in expired {
            if let Some(in_flight) = self.in_flight.remove(&receipt) {
                self.messages.push_back(in_flight.message);
            }
        }

        self.messages
            .make_contiguous()
            .sort_by_key(|message| message.sequence);
    }
}

/// A message stored in the queue with metadata
#[derive(Clone)]
struct StoredMessage {
    sequence: u64,
    message_id: MessageId,
    attributes: Attributes,
    body: Bytes,
    delivery_count: u32,
}

/// A message currently hidden from other consumers
struct InFlightMessage {
    message: StoredMessage,
    visible_at: Instant,
}

/// One recorded call against the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    CreateOrGetQueue {
        queue: String,
        visibility_timeout: Duration,
    },
    SetMessageType {
        queue: String,
        message_type: String,
    },
    WriteMessage {
        queue: String,
        message_id: MessageId,
    },
    FetchMessages {
        queue: String,
        max_count: u32,
        returned: usize,
    },
    DeleteMessage {
        queue: String,
        message_id: MessageId,
    },
}

// ============================================================================
// InMemoryQueueService
// ============================================================================

/// In-memory queue service; clones share the same queues
#[derive(Clone, Default)]
pub struct InMemoryQueueService {
    storage: Arc<Mutex<ServiceStorage>>,
}

impl InMemoryQueueService {
    pub fn new() -> Self {
        Self::default()
    }

    fn storage(&self) -> MutexGuard<'_, ServiceStorage> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every call made so far, oldest first
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.storage().calls.clone()
    }

    /// Number of recorded calls matching `predicate`
    pub fn count_calls(&self, predicate: impl Fn(&ServiceCall) -> bool) -> usize {
        self.storage().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Make the next fetch (on any queue) fail with `error`
    pub fn fail_next_fetch(&self, error: QueueError) {
        self.storage().fetch_failures.push_back(error);
    }

    /// Messages not yet deleted, visible or in flight
    pub fn queue_depth(&self, queue: &str) -> usize {
        let storage = self.storage();
        find_queue(&storage, queue)
            .map(|q| q.messages.len() + q.in_flight.len())
            .unwrap_or(0)
    }

    /// Messages fetched but neither deleted nor released
    pub fn in_flight_count(&self, queue: &str) -> usize {
        let storage = self.storage();
        find_queue(&storage, queue)
            .map(|q| q.in_flight.len())
            .unwrap_or(0)
    }

    /// Message class declared for the queue, if any
    pub fn message_class(&self, queue: &str) -> Option<MessageClass> {
        let storage = self.storage();
        find_queue(&storage, queue).and_then(|q| q.message_class.clone())
    }

    /// Visibility timeout the queue was created with
    pub fn visibility_timeout(&self, queue: &str) -> Option<Duration> {
        let storage = self.storage();
        find_queue(&storage, queue).map(|q| q.visibility_timeout)
    }

    /// Names of all queues created so far
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .storage()
            .queues
            .keys()
            .map(|name| name.as_str().to_string())
            .collect();
        names.sort();
        names
    }
}

fn find_queue<'a>(storage: &'a ServiceStorage, queue: &str) -> Option<&'a InMemoryQueue> {
    storage
        .queues
        .iter()
        .find(|(name, _)| name.as_str() == queue)
        .map(|(_, q)| q)
}

fn queue_not_found(handle: &QueueHandle) -> QueueError {
    QueueError::QueueNotFound {
        queue_name: handle.name().to_string(),
    }
}

#[async_trait]
impl QueueServiceClient for InMemoryQueueService {
    async fn create_or_get_queue(
        &self,
        full_name: &QueueName,
        visibility_timeout: Duration,
    ) -> Result<QueueHandle, QueueError> {
        let mut storage = self.storage();
        storage.calls.push(ServiceCall::CreateOrGetQueue {
            queue: full_name.to_string(),
            visibility_timeout,
        });

        let queue = storage
            .queues
            .entry(full_name.clone())
            .or_insert_with(|| InMemoryQueue::new(visibility_timeout));

        debug!(queue = %full_name, "In-memory queue ready");

        Ok(QueueHandle::new(
            full_name.clone(),
            format!("memory://{}", full_name),
            queue.visibility_timeout,
        ))
    }

    async fn set_message_type(
        &self,
        handle: &QueueHandle,
        message_class: &MessageClass,
    ) -> Result<(), QueueError> {
        let mut storage = self.storage();
        storage.calls.push(ServiceCall::SetMessageType {
            queue: handle.name().to_string(),
            message_type: message_class.message_type().to_string(),
        });

        let queue = storage
            .queues
            .get_mut(handle.name())
            .ok_or_else(|| queue_not_found(handle))?;
        queue.message_class = Some(message_class.clone());
        Ok(())
    }

    async fn write_message(
        &self,
        handle: &QueueHandle,
        message: OutboundMessage,
    ) -> Result<MessageId, QueueError> {
        let mut storage = self.storage();
        let sequence = storage.next_sequence;
        storage.next_sequence += 1;

        let message_id = MessageId::new();
        let queue = storage
            .queues
            .get_mut(handle.name())
            .ok_or_else(|| queue_not_found(handle))?;

        queue.messages.push_back(StoredMessage {
            sequence,
            message_id: message_id.clone(),
            attributes: message.attributes,
            body: message.body,
            delivery_count: 0,
        });

        storage.calls.push(ServiceCall::WriteMessage {
            queue: handle.name().to_string(),
            message_id: message_id.clone(),
        });

        Ok(message_id)
    }

    async fn fetch_messages(
        &self,
        handle: &QueueHandle,
        max_count: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let now = Instant::now();
        let mut storage = self.storage();

        if let Some(error) = storage.fetch_failures.pop_front() {
            storage.calls.push(ServiceCall::FetchMessages {
                queue: handle.name().to_string(),
                max_count,
                returned: 0,
            });
            return Err(error);
        }

        let queue = storage
            .queues
            .get_mut(handle.name())
            .ok_or_else(|| queue_not_found(handle))?;

        queue.release_expired(now);

        let visible_at = now + queue.visibility_timeout;
        let mut fetched = Vec::new();
        while fetched.len() < max_count as usize {
            let Some(mut message) = queue.messages.pop_front() else {
                break;
            };
            message.delivery_count += 1;

            let receipt = uuid::Uuid::new_v4().to_string();
            fetched.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                receipt_handle: ReceiptHandle::new(receipt.clone()),
                attributes: message.attributes.clone(),
                body: message.body.clone(),
                delivery_count: message.delivery_count,
                received_at: Timestamp::now(),
            });
            queue
                .in_flight
                .insert(receipt, InFlightMessage { message, visible_at });
        }

        storage.calls.push(ServiceCall::FetchMessages {
            queue: handle.name().to_string(),
            max_count,
            returned: fetched.len(),
        });

        Ok(fetched)
    }

    async fn delete_message(
        &self,
        handle: &QueueHandle,
        message: &ReceivedMessage,
    ) -> Result<(), QueueError> {
        let now = Instant::now();
        let mut storage = self.storage();

        let queue = storage
            .queues
            .get_mut(handle.name())
            .ok_or_else(|| queue_not_found(handle))?;

        // A lapsed receipt no longer owns the message.
        let receipt = message.receipt_handle.as_str();
        let still_hidden = queue
            .in_flight
            .get(receipt)
            .is_some_and(|in_flight| now < in_flight.visible_at);
        if !still_hidden {
            return Err(QueueError::MessageNotFound {
                receipt: receipt.to_string(),
            });
        }
        queue.in_flight.remove(receipt);

        storage.calls.push(ServiceCall::DeleteMessage {
            queue: handle.name().to_string(),
            message_id: message.message_id.clone(),
        });

        Ok(())
    }

    fn service_name(&self) -> &'static str {
        "in-memory"
    }
}
