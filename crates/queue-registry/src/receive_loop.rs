//! Long-running receive loop for registered queues.
//!
//! The loop fetches up to one batch per cycle, dispatches each message to the
//! queue's receiver in fetch order and deletes only the messages whose
//! receiver succeeded. Every other message is left in place and becomes
//! visible again once its visibility timeout lapses, which is the only retry
//! mechanism.
//!
//! ## Failure containment
//!
//! A receiver failure, a decode failure, a handler timeout or a failed
//! delete is logged as a [`DispatchOutcome`] and the loop moves on to the
//! next message. Two conditions end the loop:
//!
//! - the `shutdown` future completes, which returns a [`LoopReport`]
//! - a receiver returns [`HandlerError::Interrupted`], which returns
//!   [`QueueError::Interrupted`] and leaves the current message unacknowledged
//!
//! Transient fetch errors are retried after one poll period; permanent fetch
//! errors are returned.

use crate::client::QueueHandle;
use crate::error::{HandlerError, QueueError};
use crate::message::{MessageId, QueueMessage, ReceivedMessage};
use crate::receiver::Receiver;
use crate::registered_queue::RegisteredQueue;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Level};

// ============================================================================
// Loop Types
// ============================================================================

/// Options for [`RegisteredQueue::receive_loop_with`]
#[derive(Debug, Clone, Default)]
pub struct LoopOptions {
    /// Consume `full_name__suffix` instead of the main queue
    pub suffix: Option<String>,
    /// Stop after this many messages were dispatched
    pub message_limit: Option<u64>,
    /// Channel receiving one outcome per dispatched message
    pub outcomes: Option<mpsc::UnboundedSender<DispatchOutcome>>,
}

impl LoopOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_message_limit(mut self, limit: u64) -> Self {
        self.message_limit = Some(limit);
        self
    }

    pub fn with_outcomes(mut self, sender: mpsc::UnboundedSender<DispatchOutcome>) -> Self {
        self.outcomes = Some(sender);
        self
    }
}

/// What happened to one dispatched message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Receiver succeeded and the message was deleted
    Acknowledged,
    /// Receiver or decoding failed; the message will be redelivered
    Failed { error: String },
    /// Receiver asked for redelivery
    Deferred,
    /// Receiver exceeded the handler timeout and was abandoned
    TimedOut { after: Duration },
    /// Receiver succeeded but the delete failed; the message will be redelivered
    AcknowledgeFailed { error: String },
    /// Receiver requested that the loop stop
    Interrupted,
}

/// Per-message dispatch record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub queue: String,
    pub message_id: MessageId,
    pub delivery_count: u32,
    pub status: DispatchStatus,
}

impl DispatchStatus {
    /// Level at which the receive loop logs this status
    pub fn log_level(&self) -> Level {
        match self {
            Self::Acknowledged | Self::Deferred => Level::DEBUG,
            Self::Failed { .. } => Level::ERROR,
            Self::TimedOut { .. } | Self::AcknowledgeFailed { .. } => Level::WARN,
            Self::Interrupted => Level::INFO,
        }
    }
}

impl DispatchOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self.status, DispatchStatus::Acknowledged)
    }
}

/// Why a loop returned normally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Shutdown,
    MessageLimit,
}

/// Counters collected over the lifetime of one loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopReport {
    pub fetches: u64,
    pub empty_polls: u64,
    pub fetch_errors: u64,
    pub dispatched: u64,
    pub acknowledged: u64,
    pub failed: u64,
    pub deferred: u64,
    pub timed_out: u64,
    pub acknowledge_failures: u64,
    pub stop_reason: Option<StopReason>,
}

impl LoopReport {
    fn record(&mut self, status: &DispatchStatus) {
        self.dispatched += 1;
        match status {
            DispatchStatus::Acknowledged => self.acknowledged += 1,
            DispatchStatus::Failed { .. } => self.failed += 1,
            DispatchStatus::Deferred => self.deferred += 1,
            DispatchStatus::TimedOut { .. } => self.timed_out += 1,
            DispatchStatus::AcknowledgeFailed { .. } => self.acknowledge_failures += 1,
            DispatchStatus::Interrupted => {}
        }
    }

    fn stop(mut self, reason: StopReason) -> Self {
        self.stop_reason = Some(reason);
        self
    }

    fn limit_reached(&self, limit: Option<u64>) -> bool {
        limit.is_some_and(|limit| self.dispatched >= limit)
    }

    /// Batch size capped by the messages still allowed under `limit`
    fn fetch_size(&self, batch_size: u32, limit: Option<u64>) -> u32 {
        match limit {
            Some(limit) => {
                let remaining = limit.saturating_sub(self.dispatched);
                u32::try_from(remaining).map_or(batch_size, |r| r.min(batch_size))
            }
            None => batch_size,
        }
    }
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ============================================================================
// Loop Implementation
// ============================================================================

impl<M: QueueMessage> RegisteredQueue<M> {
    /// Consume the main queue until `shutdown` completes.
    ///
    /// See [`receive_loop_with`](Self::receive_loop_with).
    pub async fn receive_loop<S>(&self, shutdown: S) -> Result<LoopReport, QueueError>
    where
        S: Future<Output = ()> + Send,
    {
        self.receive_loop_with(LoopOptions::default(), shutdown)
            .await
    }

    /// Consume the queue until `shutdown` completes, the message limit is
    /// reached, or a receiver interrupts.
    ///
    /// # Errors
    ///
    /// - [`QueueError::NotConfigured`] immediately when the queue has no receiver
    /// - [`QueueError::Interrupted`] when a receiver returns
    ///   [`HandlerError::Interrupted`]
    /// - any permanent error from queue creation or fetching
    pub async fn receive_loop_with<S>(
        &self,
        options: LoopOptions,
        shutdown: S,
    ) -> Result<LoopReport, QueueError>
    where
        S: Future<Output = ()> + Send,
    {
        let receiver = Arc::clone(self.receiver()?);
        let handle = self.get_queue_for(options.suffix.as_deref()).await?;
        let mut report = LoopReport::default();
        tokio::pin!(shutdown);

        info!(
            queue = %self.name,
            full_name = %handle.name(),
            batch_size = self.batch_size,
            poll_period_secs = self.poll_period.as_secs(),
            "Receive loop started"
        );

        loop {
            if report.limit_reached(options.message_limit) {
                return Ok(self.finish(report, StopReason::MessageLimit));
            }

            // Capped at the remaining message limit
            let max_count = report.fetch_size(self.batch_size, options.message_limit);
            let fetched = tokio::select! {
                biased;
                _ = &mut shutdown => return Ok(self.finish(report, StopReason::Shutdown)),
                fetched = self.service.fetch_messages(&handle, max_count) => fetched,
            };
            report.fetches += 1;

            let batch = match fetched {
                Ok(batch) => batch,
                Err(e) if e.is_transient() => {
                    report.fetch_errors += 1;
                    warn!(
                        queue = %self.name,
                        error = %e,
                        "Transient fetch failure, retrying after poll period"
                    );
                    if self.idle(&mut shutdown).await {
                        return Ok(self.finish(report, StopReason::Shutdown));
                    }
                    continue;
                }
                Err(e) => {
                    error!(queue = %self.name, error = %e, "Fetch failed, stopping receive loop");
                    return Err(e);
                }
            };

            if batch.is_empty() {
                report.empty_polls += 1;
                if self.idle(&mut shutdown).await {
                    return Ok(self.finish(report, StopReason::Shutdown));
                }
                continue;
            }

            debug!(queue = %self.name, count = batch.len(), "Fetched batch");

            for received in batch {
                let outcome = tokio::select! {
                    biased;
                    _ = &mut shutdown => return Ok(self.finish(report, StopReason::Shutdown)),
                    outcome = self.dispatch(&receiver, &handle, received) => outcome,
                };

                report.record(&outcome.status);
                let interrupted = outcome.status == DispatchStatus::Interrupted;
                if let Some(sender) = &options.outcomes {
                    let _ = sender.send(outcome);
                }

                if interrupted {
                    info!(queue = %self.name, "Receiver interrupted the receive loop");
                    return Err(QueueError::Interrupted {
                        queue: self.name.to_string(),
                    });
                }

                if report.limit_reached(options.message_limit) {
                    return Ok(self.finish(report, StopReason::MessageLimit));
                }
            }
        }
    }

    /// Sleep one poll period; `true` when shutdown completed first
    async fn idle<S>(&self, shutdown: &mut Pin<&mut S>) -> bool
    where
        S: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = shutdown.as_mut() => true,
            _ = tokio::time::sleep(self.poll_period) => false,
        }
    }

    fn finish(&self, report: LoopReport, reason: StopReason) -> LoopReport {
        info!(
            queue = %self.name,
            reason = ?reason,
            dispatched = report.dispatched,
            acknowledged = report.acknowledged,
            "Receive loop stopped"
        );
        report.stop(reason)
    }

    /// Decode, invoke and acknowledge one message, containing every failure
    async fn dispatch(
        &self,
        receiver: &Arc<dyn Receiver<M>>,
        handle: &QueueHandle,
        received: ReceivedMessage,
    ) -> DispatchOutcome {
        let status = match M::from_parts(received.attributes.clone(), received.body.clone()) {
            Ok(message) => self.invoke(receiver, handle, &received, message).await,
            Err(e) => DispatchStatus::Failed {
                error: format!("message could not be decoded: {}", e),
            },
        };

        let outcome = DispatchOutcome {
            queue: self.name.to_string(),
            message_id: received.message_id,
            delivery_count: received.delivery_count,
            status,
        };
        log_outcome(&outcome);
        outcome
    }

    async fn invoke(
        &self,
        receiver: &Arc<dyn Receiver<M>>,
        handle: &QueueHandle,
        received: &ReceivedMessage,
        message: M,
    ) -> DispatchStatus {
        let receiver = Arc::clone(receiver);
        let mut task = AbortOnDrop(tokio::spawn(async move {
            receiver.receive(&message).await
        }));

        let joined = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task.0).await {
                Ok(joined) => joined,
                Err(_) => return DispatchStatus::TimedOut { after: limit },
            },
            None => (&mut task.0).await,
        };

        match joined {
            Ok(Ok(_)) => match self.service.delete_message(handle, received).await {
                Ok(()) => DispatchStatus::Acknowledged,
                Err(e) => DispatchStatus::AcknowledgeFailed {
                    error: e.to_string(),
                },
            },
            Ok(Err(HandlerError::RestartLater)) => DispatchStatus::Deferred,
            Ok(Err(HandlerError::Interrupted)) => DispatchStatus::Interrupted,
            Ok(Err(HandlerError::Failed(e))) => DispatchStatus::Failed {
                error: format!("{:#}", e),
            },
            Err(join_error) if join_error.is_panic() => DispatchStatus::Failed {
                error: "receiver panicked".to_string(),
            },
            Err(join_error) => DispatchStatus::Failed {
                error: join_error.to_string(),
            },
        }
    }
}

fn log_outcome(outcome: &DispatchOutcome) {
    let queue = outcome.queue.as_str();
    let message_id = outcome.message_id.as_str();
    let delivery_count = outcome.delivery_count;

    let (message, error) = match &outcome.status {
        DispatchStatus::Acknowledged => ("Message processed and acknowledged", None),
        DispatchStatus::Failed { error } => (
            "Message processing failed, leaving it for redelivery",
            Some(error.clone()),
        ),
        DispatchStatus::Deferred => ("Receiver requested redelivery", None),
        DispatchStatus::TimedOut { after } => (
            "Receiver timed out, leaving message for redelivery",
            Some(format!("no result after {:?}", after)),
        ),
        DispatchStatus::AcknowledgeFailed { error } => (
            "Message processed but could not be deleted",
            Some(error.clone()),
        ),
        DispatchStatus::Interrupted => ("Receiver requested shutdown", None),
    };
    let error = error.as_deref();

    match outcome.status.log_level() {
        Level::ERROR => error!(queue, message_id, delivery_count, error, "{}", message),
        Level::WARN => warn!(queue, message_id, delivery_count, error, "{}", message),
        Level::INFO => info!(queue, message_id, delivery_count, error, "{}", message),
        _ => debug!(queue, message_id, delivery_count, error, "{}", message),
    }
}

#[cfg(test)]
#[path = "receive_loop_tests.rs"]
mod tests;
