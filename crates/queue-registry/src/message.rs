//! Message types: the message contract, the base message and wire envelopes.

use crate::error::{ConfigurationError, SerializationError, ValidationError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Attribute bag carried by every message
pub type Attributes = HashMap<String, String>;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Unique identifier for messages within the queue system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque token issued by the queue service for acknowledging a fetched message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// ============================================================================
// Message Contract
// ============================================================================

/// Capability interface every message class must provide.
///
/// A message class exposes an attribute bag and a body, and can be rebuilt
/// from those two parts. The queue service only ever sees the parts; the
/// class is reconstructed on fetch through [`QueueMessage::from_parts`].
pub trait QueueMessage: Clone + fmt::Debug + Send + Sync + 'static {
    /// Tag identifying the message class on the wire.
    const MESSAGE_TYPE: &'static str;

    fn attributes(&self) -> &Attributes;

    fn body(&self) -> &Bytes;

    /// Construct the message from its attribute bag and body.
    fn from_parts(attributes: Attributes, body: Bytes) -> Result<Self, SerializationError>;

    /// Split the message into the parts written to the queue service.
    fn to_outbound(&self) -> OutboundMessage {
        OutboundMessage {
            attributes: self.attributes().clone(),
            body: self.body().clone(),
        }
    }
}

/// Runtime descriptor of a message class bound to a registered queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageClass {
    type_id: TypeId,
    type_name: &'static str,
    message_type: &'static str,
}

impl MessageClass {
    /// Describe the message class `M`
    pub fn of<M: QueueMessage>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
            message_type: M::MESSAGE_TYPE,
        }
    }

    /// Check the class against the message contract.
    ///
    /// The wire tag must be 1-64 characters of ASCII alphanumerics, `.`, `_`
    /// or `-` so that it can travel as a queue-service attribute value.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |message: &str| ConfigurationError::InvalidMessageClass {
            type_name: self.type_name.to_string(),
            message: message.to_string(),
        };

        if self.message_type.is_empty() {
            return Err(invalid("message type tag must not be empty"));
        }

        if self.message_type.len() > 64 {
            return Err(invalid("message type tag must be at most 64 characters"));
        }

        if !self
            .message_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
        {
            return Err(invalid(
                "message type tag may only contain ASCII alphanumerics, '.', '_' and '-'",
            ));
        }

        Ok(())
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn message_type(&self) -> &'static str {
        self.message_type
    }

    /// Check whether this descriptor describes `M`
    pub fn is<M: QueueMessage>(&self) -> bool {
        self.type_id == TypeId::of::<M>()
    }
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.type_name, self.message_type)
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// The base message class: an attribute bag plus an opaque body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(with = "bytes_serde")]
    pub body: Bytes,
    #[serde(default)]
    pub attributes: Attributes,
}

/// Custom serialization for Bytes
mod bytes_serde {
    use base64::{engine::general_purpose, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = general_purpose::STANDARD.encode(bytes);
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)?;
        Ok(Bytes::from(decoded))
    }
}

impl Message {
    /// Create new message with body
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            attributes: Attributes::new(),
        }
    }

    /// Create a message whose body is the JSON encoding of `value`
    pub fn from_json<T: Serialize>(value: &T) -> Result<Self, SerializationError> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(body))
    }

    /// Add message attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Decode the body as JSON
    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, SerializationError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Borrow the body as UTF-8 text
    pub fn body_text(&self) -> Result<&str, SerializationError> {
        std::str::from_utf8(&self.body).map_err(|_| SerializationError::InvalidUtf8)
    }
}

impl QueueMessage for Message {
    const MESSAGE_TYPE: &'static str = "message";

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn body(&self) -> &Bytes {
        &self.body
    }

    fn from_parts(attributes: Attributes, body: Bytes) -> Result<Self, SerializationError> {
        Ok(Self { body, attributes })
    }
}

/// The parts of a message handed to the queue service on write
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub attributes: Attributes,
    pub body: Bytes,
}

/// A message fetched from the queue service, still in flight
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub receipt_handle: ReceiptHandle,
    pub attributes: Attributes,
    pub body: Bytes,
    pub delivery_count: u32,
    pub received_at: Timestamp,
}

/// A fetched message decoded into the configured message class
#[derive(Debug, Clone)]
pub struct Received<M> {
    pub message: M,
    pub message_id: MessageId,
    pub receipt_handle: ReceiptHandle,
    pub delivery_count: u32,
    pub received_at: Timestamp,
}

impl<M: QueueMessage> Received<M> {
    /// Decode a fetched message into `M`
    pub fn decode(received: ReceivedMessage) -> Result<Self, SerializationError> {
        let message = M::from_parts(received.attributes, received.body)?;
        Ok(Self {
            message,
            message_id: received.message_id,
            receipt_handle: received.receipt_handle,
            delivery_count: received.delivery_count,
            received_at: received.received_at,
        })
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
