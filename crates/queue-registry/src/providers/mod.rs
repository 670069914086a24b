//! Queue service implementations.
//!
//! This module contains concrete implementations of the
//! [`QueueServiceClient`](crate::client::QueueServiceClient) trait.

#[cfg(feature = "aws")]
pub mod aws;
pub mod memory;

#[cfg(feature = "aws")]
pub use aws::{SqsConfig, SqsQueueService};
pub use memory::{InMemoryQueueService, ServiceCall};
