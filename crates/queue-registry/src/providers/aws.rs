//! AWS SQS queue service built on the AWS SDK.
//!
//! ## Mapping
//!
//! - `create_or_get_queue` issues `CreateQueue` with the `VisibilityTimeout`
//!   attribute; SQS returns the existing queue URL when the queue exists with
//!   the same attributes
//! - `write_message` issues `SendMessage`; attributes travel as `String`
//!   message attributes and bodies must be UTF-8
//! - `fetch_messages` issues `ReceiveMessage` (at most 10 messages) and reads
//!   `ApproximateReceiveCount` as the delivery count
//! - `delete_message` issues `DeleteMessage` with the fetched receipt handle
//!
//! Credentials and region come from the standard AWS configuration chain;
//! [`SqsConfig`] can pin the region and override the endpoint (for example
//! to target a local SQS emulator).

use crate::client::{QueueHandle, QueueServiceClient};
use crate::error::{QueueError, SerializationError};
use crate::message::{
    Attributes, MessageClass, MessageId, OutboundMessage, ReceiptHandle, ReceivedMessage,
    Timestamp,
};
use crate::naming::QueueName;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sqs::types::{MessageAttributeValue, MessageSystemAttributeName, QueueAttributeName};
use aws_sdk_sqs::Client;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

#[cfg(test)]
#[path = "aws_tests.rs"]
mod tests;

const PROVIDER: &str = "aws-sqs";

/// Largest batch `ReceiveMessage` accepts
const SQS_MAX_BATCH: u32 = 10;

/// AWS SQS connection settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqsConfig {
    /// Region override; the AWS configuration chain is used when absent
    pub region: Option<String>,
    /// Endpoint override, e.g. `http://localhost:4566`
    pub endpoint_url: Option<String>,
}

/// Queue service backed by AWS SQS
#[derive(Clone)]
pub struct SqsQueueService {
    client: Client,
}

impl SqsQueueService {
    /// Build a service from the AWS configuration chain plus `config` overrides
    pub async fn from_config(config: &SqsConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_sqs::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint.clone());
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    /// Wrap an already configured SDK client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl fmt::Debug for SqsQueueService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqsQueueService").finish_non_exhaustive()
    }
}

/// Map an SQS error code to the queue error taxonomy
fn classify_service_error(code: Option<&str>, message: String, locator: &str) -> QueueError {
    match code {
        Some("AWS.SimpleQueueService.NonExistentQueue") | Some("QueueDoesNotExist") => {
            QueueError::QueueNotFound {
                queue_name: locator.to_string(),
            }
        }
        Some("ReceiptHandleIsInvalid") | Some("InvalidReceiptHandle") => {
            QueueError::MessageNotFound { receipt: message }
        }
        code => QueueError::ProviderError {
            provider: PROVIDER.to_string(),
            code: code.unwrap_or("Unknown").to_string(),
            message,
        },
    }
}

fn map_sdk_error<E, R>(error: SdkError<E, R>, locator: &str) -> QueueError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: fmt::Debug + Send + Sync + 'static,
{
    match &error {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => QueueError::ConnectionFailed {
            message: DisplayErrorContext(&error).to_string(),
        },
        _ => {
            let code = error.code().map(str::to_string);
            classify_service_error(
                code.as_deref(),
                DisplayErrorContext(&error).to_string(),
                locator,
            )
        }
    }
}

fn missing_field(field: &str) -> QueueError {
    QueueError::ProviderError {
        provider: PROVIDER.to_string(),
        code: "MissingField".to_string(),
        message: format!("SQS response did not include {}", field),
    }
}

#[async_trait]
impl QueueServiceClient for SqsQueueService {
    #[instrument(skip(self))]
    async fn create_or_get_queue(
        &self,
        full_name: &QueueName,
        visibility_timeout: Duration,
    ) -> Result<QueueHandle, QueueError> {
        let output = self
            .client
            .create_queue()
            .queue_name(full_name.as_str())
            .attributes(
                QueueAttributeName::VisibilityTimeout,
                visibility_timeout.as_secs().to_string(),
            )
            .send()
            .await
            .map_err(|e| map_sdk_error(e, full_name.as_str()))?;

        let queue_url = output
            .queue_url()
            .ok_or_else(|| missing_field("QueueUrl"))?;

        debug!(queue_url = %queue_url, "SQS queue ready");

        Ok(QueueHandle::new(
            full_name.clone(),
            queue_url,
            visibility_timeout,
        ))
    }

    async fn set_message_type(
        &self,
        handle: &QueueHandle,
        message_class: &MessageClass,
    ) -> Result<(), QueueError> {
        // Decoding happens client side; SQS has no notion of message classes.
        debug!(
            queue = %handle.name(),
            message_type = message_class.message_type(),
            "Bound message class to SQS queue"
        );
        Ok(())
    }

    async fn write_message(
        &self,
        handle: &QueueHandle,
        message: OutboundMessage,
    ) -> Result<MessageId, QueueError> {
        let body =
            String::from_utf8(message.body.to_vec()).map_err(|_| SerializationError::InvalidUtf8)?;

        let mut request = self
            .client
            .send_message()
            .queue_url(handle.locator())
            .message_body(body);

        for (key, value) in message.attributes {
            let attribute = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value)
                .build()
                .map_err(|_| SerializationError::InvalidAttribute { key: key.clone() })?;
            request = request.message_attributes(key, attribute);
        }

        let output = request
            .send()
            .await
            .map_err(|e| map_sdk_error(e, handle.locator()))?;

        let message_id = output
            .message_id()
            .ok_or_else(|| missing_field("MessageId"))?;
        Ok(message_id.parse()?)
    }

    async fn fetch_messages(
        &self,
        handle: &QueueHandle,
        max_count: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let max_count = max_count.clamp(1, SQS_MAX_BATCH);

        let output = self
            .client
            .receive_message()
            .queue_url(handle.locator())
            .max_number_of_messages(max_count as i32)
            .message_attribute_names("All")
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, handle.locator()))?;

        let mut fetched = Vec::with_capacity(output.messages().len());
        for message in output.messages() {
            let message_id = message
                .message_id()
                .ok_or_else(|| missing_field("MessageId"))?;
            let receipt = message
                .receipt_handle()
                .ok_or_else(|| missing_field("ReceiptHandle"))?;

            let attributes: Attributes = message
                .message_attributes()
                .map(|attributes| {
                    attributes
                        .iter()
                        .filter_map(|(key, value)| {
                            value.string_value().map(|v| (key.clone(), v.to_string()))
                        })
                        .collect()
                })
                .unwrap_or_default();

            let delivery_count = message
                .attributes()
                .and_then(|a| a.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                .and_then(|count| count.parse().ok())
                .unwrap_or(1);

            fetched.push(ReceivedMessage {
                message_id: message_id.parse()?,
                receipt_handle: ReceiptHandle::new(receipt),
                attributes,
                body: Bytes::from(message.body().unwrap_or_default().to_string()),
                delivery_count,
                received_at: Timestamp::now(),
            });
        }

        Ok(fetched)
    }

    async fn delete_message(
        &self,
        handle: &QueueHandle,
        message: &ReceivedMessage,
    ) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(handle.locator())
            .receipt_handle(message.receipt_handle.as_str())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, handle.locator()))?;
        Ok(())
    }

    fn service_name(&self) -> &'static str {
        PROVIDER
    }
}
