//! Process-wide registry of named queues.
//!
//! The registry maps logical names to [`RegisteredQueue`]s of any message
//! class. Entries are stored type-erased and recovered with a checked
//! downcast, so looking a queue up with the wrong message class is a
//! [`QueueError::TypeMismatch`] rather than a silent misuse.
//!
//! Registering a second queue under an existing name replaces the first.

use crate::client::QueueServiceClient;
use crate::config::{QueueOptions, RegistrySettings};
use crate::error::{ConfigurationError, QueueError};
use crate::message::{MessageClass, MessageId, QueueMessage};
use crate::naming::{HandlerOrigin, QueueName};
use crate::receiver::Receiver;
use crate::registered_queue::{RegisteredQueue, SendOptions};
use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

// ============================================================================
// Type Erasure
// ============================================================================

/// Object-safe view of a [`RegisteredQueue`] of any message class
#[async_trait]
trait ErasedQueue: Send + Sync {
    fn queue_name(&self) -> &QueueName;

    fn class(&self) -> &MessageClass;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Send a message built from attributes and body by the queue's own class
    async fn send_parts(&self, options: SendOptions) -> Result<MessageId, QueueError>;
}

#[async_trait]
impl<M: QueueMessage> ErasedQueue for RegisteredQueue<M> {
    fn queue_name(&self) -> &QueueName {
        self.name()
    }

    fn class(&self) -> &MessageClass {
        self.message_class()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    async fn send_parts(&self, options: SendOptions) -> Result<MessageId, QueueError> {
        self.send(None, options).await
    }
}

// ============================================================================
// QueueRegistry
// ============================================================================

/// Registry of named queues sharing one queue service and one set of settings
pub struct QueueRegistry {
    service: Arc<dyn QueueServiceClient>,
    settings: RegistrySettings,
    queues: RwLock<HashMap<String, Arc<dyn ErasedQueue>>>,
}

impl QueueRegistry {
    /// Create an empty registry
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when `settings` are invalid.
    pub fn new(
        service: Arc<dyn QueueServiceClient>,
        settings: RegistrySettings,
    ) -> Result<Self, ConfigurationError> {
        settings.validate()?;
        Ok(Self {
            service,
            settings,
            queues: RwLock::new(HashMap::new()),
        })
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn service(&self) -> Arc<dyn QueueServiceClient> {
        Arc::clone(&self.service)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<dyn ErasedQueue>>> {
        self.queues.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<dyn ErasedQueue>>> {
        self.queues.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare a queue and record it under its logical name.
    ///
    /// A previous registration under the same name is replaced.
    pub fn register<M: QueueMessage>(
        &self,
        name: &str,
        receiver: Option<Arc<dyn Receiver<M>>>,
        options: QueueOptions,
    ) -> Result<Arc<RegisteredQueue<M>>, ConfigurationError> {
        let queue = Arc::new(RegisteredQueue::new(
            Arc::clone(&self.service),
            name,
            receiver,
            options,
            &self.settings,
        )?);

        let key = queue.name().to_string();
        let previous = self
            .write()
            .insert(key.clone(), Arc::clone(&queue) as Arc<dyn ErasedQueue>);

        match previous {
            Some(previous) => warn!(
                queue = %key,
                replaced_class = %previous.class(),
                message_class = %queue.message_class(),
                "Queue registration replaced an existing entry"
            ),
            None => info!(
                queue = %key,
                full_name = %queue.full_name(),
                message_class = %queue.message_class(),
                has_receiver = queue.has_receiver(),
                "Queue registered"
            ),
        }

        Ok(queue)
    }

    /// Register `receiver` as the handler of a queue.
    ///
    /// The queue name defaults to one derived from `origin`. The returned
    /// proxy still invokes the receiver directly and can enqueue messages for
    /// it.
    pub fn receiver<M: QueueMessage>(
        &self,
        name: Option<&str>,
        origin: HandlerOrigin,
        receiver: Arc<dyn Receiver<M>>,
        options: QueueOptions,
    ) -> Result<ReceiverProxy<M>, ConfigurationError> {
        let name = match name {
            Some(name) => name.to_string(),
            None => origin.queue_name(),
        };
        let queue = self.register(&name, Some(receiver), options)?;
        Ok(ReceiverProxy { queue, origin })
    }

    fn entry(&self, name: &str) -> Result<Arc<dyn ErasedQueue>, QueueError> {
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| QueueError::NotFound {
                queue: name.to_string(),
            })
    }

    /// Look up a queue and recover its message class
    pub fn get<M: QueueMessage>(&self, name: &str) -> Result<Arc<RegisteredQueue<M>>, QueueError> {
        let entry = self.entry(name)?;
        let mismatch = |actual: &MessageClass| QueueError::TypeMismatch {
            queue: name.to_string(),
            expected: std::any::type_name::<M>().to_string(),
            actual: actual.type_name().to_string(),
        };

        if !entry.class().is::<M>() {
            return Err(mismatch(entry.class()));
        }

        let class = entry.class().clone();
        entry
            .into_any()
            .downcast::<RegisteredQueue<M>>()
            .map_err(|_| mismatch(&class))
    }

    /// Send a message of class `M` to the queue registered under `name`.
    ///
    /// Lookup and class checks happen before any service call.
    pub async fn send<M: QueueMessage>(
        &self,
        name: &str,
        message: Option<M>,
        options: SendOptions,
    ) -> Result<MessageId, QueueError> {
        let queue = self.get::<M>(name)?;
        queue.send(message, options).await
    }

    /// Send a message built by the registered class from attributes and body
    pub async fn send_attributes(
        &self,
        name: &str,
        options: SendOptions,
    ) -> Result<MessageId, QueueError> {
        let entry = self.entry(name)?;
        entry.send_parts(options).await
    }

    /// Message class registered under `name`
    pub fn message_class(&self, name: &str) -> Option<MessageClass> {
        self.read().get(name).map(|entry| entry.class().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered logical names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl fmt::Debug for QueueRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueRegistry")
            .field("service", &self.service.service_name())
            .field("settings", &self.settings)
            .field("queues", &self.names())
            .finish()
    }
}

// ============================================================================
// ReceiverProxy
// ============================================================================

/// Handle returned when a receiver is registered.
///
/// Calling [`receive`](Self::receive) runs the receiver directly with no
/// queue involvement; [`send`](Self::send) enqueues a message for it.
pub struct ReceiverProxy<M: QueueMessage> {
    queue: Arc<RegisteredQueue<M>>,
    origin: HandlerOrigin,
}

impl<M: QueueMessage> ReceiverProxy<M> {
    pub fn queue_name(&self) -> &QueueName {
        self.queue.name()
    }

    pub fn origin(&self) -> HandlerOrigin {
        self.origin
    }

    pub fn registered_queue(&self) -> Arc<RegisteredQueue<M>> {
        Arc::clone(&self.queue)
    }

    /// Invoke the receiver directly
    pub async fn receive(&self, message: &M) -> Result<Value, QueueError> {
        self.queue.receive(message).await
    }

    /// Enqueue `message` for this receiver
    pub async fn send(&self, message: M) -> Result<MessageId, QueueError> {
        self.queue.send_message(message).await
    }

    pub async fn send_with(
        &self,
        message: Option<M>,
        options: SendOptions,
    ) -> Result<MessageId, QueueError> {
        self.queue.send(message, options).await
    }
}

impl<M: QueueMessage> Clone for ReceiverProxy<M> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            origin: self.origin,
        }
    }
}

impl<M: QueueMessage> fmt::Debug for ReceiverProxy<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverProxy")
            .field("queue", &self.queue.name())
            .field("origin", &self.origin)
            .finish()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
