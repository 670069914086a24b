//! # Queue Registry
//!
//! Named queue registration and message dispatch over managed message-queue
//! services such as AWS SQS.
//!
//! This library provides:
//! - Queues declared by logical name and bound to a message class
//! - Lazy, memoized remote queue creation
//! - Sending by queue handle or by registered name
//! - A long-running receive loop that acknowledges only successfully handled
//!   messages and relies on visibility timeouts for redelivery
//! - An in-memory queue service for tests and local development
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all registry operations
//! - [`message`] - The message contract and wire-level message types
//! - [`naming`] - Queue names, environment prefixes and derived names
//! - [`config`] - Registry settings and per-queue options
//! - [`client`] - The queue service client interface
//! - [`providers`] - In-memory and AWS SQS queue services
//! - [`receiver`] - Receivers bound to queues
//! - [`registered_queue`] - A single declared queue
//! - [`receive_loop`] - The polling and dispatch loop
//! - [`registry`] - The name to queue registry
//!
//! ## Example
//!
//! ```rust
//! use queue_registry::{
//!     receiver_fn, HandlerError, InMemoryQueueService, Message, QueueOptions, QueueRegistry,
//!     RegistrySettings, SendOptions,
//! };
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let registry = QueueRegistry::new(
//!     Arc::new(InMemoryQueueService::new()),
//!     RegistrySettings::default(),
//! )?;
//!
//! let orders = registry.register(
//!     "orders",
//!     Some(receiver_fn(|message: Message| async move {
//!         Ok::<_, HandlerError>(serde_json::json!({ "bytes": message.body.len() }))
//!     })),
//!     QueueOptions::default(),
//! )?;
//!
//! registry
//!     .send("orders", Some(Message::new(r#"{"id":1}"#)), SendOptions::default())
//!     .await?;
//!
//! let (_, result) = orders.receive_single().await?.expect("one message");
//! assert_eq!(result["bytes"], 8);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod naming;
pub mod providers;
pub mod receive_loop;
pub mod receiver;
pub mod registered_queue;
pub mod registry;

// Re-export commonly used types at crate root for convenience
pub use client::{QueueHandle, QueueServiceClient};
pub use config::{QueueOptions, RegistrySettings, MAX_BATCH_SIZE};
pub use error::{
    ConfigurationError, HandlerError, QueueError, SerializationError, ValidationError,
};
pub use message::{
    Attributes, Message, MessageClass, MessageId, OutboundMessage, QueueMessage, ReceiptHandle,
    Received, ReceivedMessage, Timestamp,
};
pub use naming::{derive_queue_name, full_queue_name, HandlerOrigin, NamingMode, QueueName};
pub use providers::{InMemoryQueueService, ServiceCall};
#[cfg(feature = "aws")]
pub use providers::{SqsConfig, SqsQueueService};
pub use receive_loop::{DispatchOutcome, DispatchStatus, LoopOptions, LoopReport, StopReason};
pub use receiver::{receiver_fn, Receiver};
pub use registered_queue::{RegisteredQueue, SendOptions};
pub use registry::{QueueRegistry, ReceiverProxy};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
