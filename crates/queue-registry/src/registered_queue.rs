//! A named queue bound to a message class and an optional receiver.
//!
//! [`RegisteredQueue`] resolves its wire name and settings once at
//! construction and performs no I/O until first use. The remote queue is
//! created lazily by [`RegisteredQueue::get_queue`]; the resulting handle is
//! memoized per suffix, and initialization is serialized so concurrent first
//! callers create the remote queue exactly once.
//!
//! The polling loop lives in [`crate::receive_loop`].

use crate::client::{QueueHandle, QueueServiceClient};
use crate::config::{validate_visibility_timeout, QueueOptions, RegistrySettings};
use crate::error::{ConfigurationError, HandlerError, QueueError};
use crate::message::{Attributes, Message, MessageClass, MessageId, QueueMessage, Received};
use crate::naming::{full_queue_name, QueueName};
use crate::receiver::Receiver;
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

// ============================================================================
// Send Options
// ============================================================================

/// Options for [`RegisteredQueue::send`]
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Address the `full_name__suffix` queue instead of the main queue
    pub suffix: Option<String>,
    /// Attributes used when the message is constructed from parts
    pub attributes: Attributes,
    /// Body used when the message is constructed from parts
    pub body: Option<Bytes>,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

// ============================================================================
// RegisteredQueue
// ============================================================================

/// A queue declared by name, bound to message class `M`
pub struct RegisteredQueue<M: QueueMessage = Message> {
    pub(crate) service: Arc<dyn QueueServiceClient>,
    pub(crate) name: QueueName,
    full_name: QueueName,
    visibility_timeout: Duration,
    pub(crate) poll_period: Duration,
    pub(crate) batch_size: u32,
    pub(crate) handler_timeout: Option<Duration>,
    receiver: Option<Arc<dyn Receiver<M>>>,
    message_class: MessageClass,
    handles: Mutex<HashMap<Option<String>, QueueHandle>>,
}

impl<M: QueueMessage> RegisteredQueue<M> {
    /// Declare a queue.
    ///
    /// Resolves defaults from `settings`, validates the message class, the
    /// name and the visibility timeout, and derives the full name. Does not
    /// contact the queue service.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when the settings, the message class,
    /// the name or the visibility timeout are invalid.
    pub fn new(
        service: Arc<dyn QueueServiceClient>,
        name: &str,
        receiver: Option<Arc<dyn Receiver<M>>>,
        options: QueueOptions,
        settings: &RegistrySettings,
    ) -> Result<Self, ConfigurationError> {
        settings.validate()?;

        let message_class = MessageClass::of::<M>();
        message_class.validate()?;

        let name = QueueName::new(name)?;
        let full_name = full_queue_name(&name, &settings.naming_mode())?;

        let visibility_timeout = options
            .visibility_timeout
            .unwrap_or_else(|| settings.default_visibility_timeout());
        validate_visibility_timeout(visibility_timeout)?;

        Ok(Self {
            service,
            name,
            full_name,
            visibility_timeout,
            poll_period: options.poll_period.unwrap_or_else(|| settings.poll_period()),
            batch_size: settings.batch_size,
            handler_timeout: options.handler_timeout,
            receiver,
            message_class,
            handles: Mutex::new(HashMap::new()),
        })
    }

    /// Logical name used in code
    pub fn name(&self) -> &QueueName {
        &self.name
    }

    /// Wire name, prefixed outside production
    pub fn full_name(&self) -> &QueueName {
        &self.full_name
    }

    pub fn visibility_timeout(&self) -> Duration {
        self.visibility_timeout
    }

    pub fn poll_period(&self) -> Duration {
        self.poll_period
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout
    }

    pub fn message_class(&self) -> &MessageClass {
        &self.message_class
    }

    pub fn has_receiver(&self) -> bool {
        self.receiver.is_some()
    }

    pub(crate) fn receiver(&self) -> Result<&Arc<dyn Receiver<M>>, QueueError> {
        self.receiver.as_ref().ok_or_else(|| QueueError::NotConfigured {
            queue: self.name.to_string(),
        })
    }

    /// Handle to the main queue, creating it on first use
    pub async fn get_queue(&self) -> Result<QueueHandle, QueueError> {
        self.get_queue_for(None).await
    }

    /// Handle to the main queue or to the `full_name__suffix` queue.
    ///
    /// The first call per suffix creates the remote queue and binds the
    /// message class; later calls return the cached handle without any
    /// service call.
    pub async fn get_queue_for(&self, suffix: Option<&str>) -> Result<QueueHandle, QueueError> {
        let key = suffix.map(str::to_string);
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(&key) {
            return Ok(handle.clone());
        }

        let wire_name = match suffix {
            Some(suffix) => self.full_name.with_suffix(suffix)?,
            None => self.full_name.clone(),
        };

        let handle = self
            .service
            .create_or_get_queue(&wire_name, self.visibility_timeout)
            .await?;
        self.service
            .set_message_type(&handle, &self.message_class)
            .await?;

        info!(
            queue = %self.name,
            full_name = %wire_name,
            service = self.service.service_name(),
            visibility_timeout_secs = self.visibility_timeout.as_secs(),
            message_class = %self.message_class,
            "Queue bound"
        );

        handles.insert(key, handle.clone());
        Ok(handle)
    }

    /// Enqueue a message.
    ///
    /// With `message` absent, one is constructed from the option's attributes
    /// and body through [`QueueMessage::from_parts`]. Failures are returned
    /// to the caller without retry.
    pub async fn send(
        &self,
        message: Option<M>,
        options: SendOptions,
    ) -> Result<MessageId, QueueError> {
        let SendOptions {
            suffix,
            attributes,
            body,
        } = options;

        let message = match message {
            Some(message) => message,
            None => M::from_parts(attributes, body.unwrap_or_default())?,
        };

        let handle = self.get_queue_for(suffix.as_deref()).await?;
        let message_id = self
            .service
            .write_message(&handle, message.to_outbound())
            .await?;

        debug!(
            queue = %self.name,
            full_name = %handle.name(),
            message_id = %message_id,
            "Message sent"
        );

        Ok(message_id)
    }

    /// Enqueue `message` on the main queue
    pub async fn send_message(&self, message: M) -> Result<MessageId, QueueError> {
        self.send(Some(message), SendOptions::default()).await
    }

    /// Invoke the receiver with `message` and return its result.
    ///
    /// No acknowledgment and no error containment happen here.
    pub async fn receive(&self, message: &M) -> Result<Value, QueueError> {
        let receiver = self.receiver()?;
        receiver
            .receive(message)
            .await
            .map_err(|source: HandlerError| QueueError::Handler {
                queue: self.name.to_string(),
                source,
            })
    }

    /// Fetch, dispatch and acknowledge at most one message from the main queue.
    ///
    /// Meant for interactive inspection. Receiver errors propagate and leave
    /// the message in the queue. Returns `None` when the queue was empty.
    pub async fn receive_single(&self) -> Result<Option<(Received<M>, Value)>, QueueError> {
        self.receive_single_from(None).await
    }

    /// [`receive_single`](Self::receive_single) against a suffixed queue
    pub async fn receive_single_from(
        &self,
        suffix: Option<&str>,
    ) -> Result<Option<(Received<M>, Value)>, QueueError> {
        self.receiver()?;
        let handle = self.get_queue_for(suffix).await?;

        let Some(fetched) = self.service.fetch_messages(&handle, 1).await?.into_iter().next()
        else {
            return Ok(None);
        };

        let received = Received::<M>::decode(fetched.clone())?;
        let value = self.receive(&received.message).await?;
        self.service.delete_message(&handle, &fetched).await?;

        debug!(
            queue = %self.name,
            message_id = %received.message_id,
            "Single message received and acknowledged"
        );

        Ok(Some((received, value)))
    }
}

impl<M: QueueMessage> fmt::Debug for RegisteredQueue<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredQueue")
            .field("name", &self.name)
            .field("full_name", &self.full_name)
            .field("visibility_timeout", &self.visibility_timeout)
            .field("message_class", &self.message_class)
            .field("has_receiver", &self.receiver.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "registered_queue_tests.rs"]
mod tests;
