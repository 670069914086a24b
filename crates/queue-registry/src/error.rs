//! Error types for queue registration, sending and receiving.

use std::time::Duration;
use thiserror::Error;

/// Comprehensive error type for all registered-queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Queue '{queue}' expects messages of type {expected}, got {actual}")]
    TypeMismatch {
        queue: String,
        expected: String,
        actual: String,
    },

    #[error("Queue '{queue}' is not configured to receive messages")]
    NotConfigured { queue: String },

    #[error("No queue registered under the name '{queue}'")]
    NotFound { queue: String },

    #[error("Receive loop for queue '{queue}' was interrupted")]
    Interrupted { queue: String },

    #[error("Receiver for queue '{queue}' failed: {source}")]
    Handler {
        queue: String,
        #[source]
        source: HandlerError,
    },

    #[error("Remote queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message not found or receipt expired: {receipt}")]
    MessageNotFound { receipt: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl QueueError {
    /// Check if error is transient and the operation may succeed when repeated
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Configuration(_) => false,
            Self::TypeMismatch { .. } => false,
            Self::NotConfigured { .. } => false,
            Self::NotFound { .. } => false,
            Self::Interrupted { .. } => false,
            Self::Handler { .. } => false,
            Self::QueueNotFound { .. } => false,
            Self::MessageNotFound { .. } => false,
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { .. } => true,
            Self::ProviderError { .. } => true, // Provider-specific errors are usually transient
            Self::Serialization(_) => false,
            Self::Validation(_) => false,
        }
    }
}

/// Errors raised by receivers while handling a single message.
///
/// Only [`HandlerError::Interrupted`] escapes the receive loop; the other
/// variants leave the message in the queue for redelivery.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(#[from] anyhow::Error),

    #[error("message handling deferred; leave message for redelivery")]
    RestartLater,

    #[error("interrupted")]
    Interrupted,
}

impl HandlerError {
    /// Build a `Failed` error from a plain message
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(anyhow::anyhow!(message.into()))
    }
}

/// Errors during message encoding/decoding
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Message body is not valid UTF-8")]
    InvalidUtf8,

    #[error("Message attribute '{key}' is missing")]
    MissingAttribute { key: String },

    #[error("Message attribute '{key}' has invalid value")]
    InvalidAttribute { key: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Message class {type_name} does not satisfy the message contract: {message}")]
    InvalidMessageClass { type_name: String, message: String },

    #[error("Invalid queue name: {0}")]
    InvalidQueueName(#[from] ValidationError),
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
