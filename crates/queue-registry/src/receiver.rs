//! Receivers: the handlers bound to registered queues.

use crate::error::HandlerError;
use crate::message::QueueMessage;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Processes one message of class `M`.
///
/// Returning `Ok` acknowledges the message when it was fetched by the receive
/// loop or by `receive_single`. The returned value is handed back to callers
/// of `receive` and `receive_single`.
#[async_trait]
pub trait Receiver<M: QueueMessage>: Send + Sync {
    async fn receive(&self, message: &M) -> Result<Value, HandlerError>;
}

/// Adapter turning an async closure into a [`Receiver`]
pub struct FnReceiver<M, F> {
    function: F,
    _message: PhantomData<fn(M)>,
}

#[async_trait]
impl<M, F, Fut> Receiver<M> for FnReceiver<M, F>
where
    M: QueueMessage,
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn receive(&self, message: &M) -> Result<Value, HandlerError> {
        (self.function)(message.clone()).await
    }
}

/// Wrap an async closure as a shareable receiver.
///
/// ```rust
/// use queue_registry::{receiver_fn, HandlerError, Message};
///
/// let receiver = receiver_fn(|message: Message| async move {
///     Ok::<_, HandlerError>(serde_json::json!({ "bytes": message.body.len() }))
/// });
/// # let _ = receiver;
/// ```
pub fn receiver_fn<M, F, Fut>(function: F) -> Arc<dyn Receiver<M>>
where
    M: QueueMessage,
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    Arc::new(FnReceiver {
        function,
        _message: PhantomData,
    })
}
