//! Tests for registered queues.

use super::*;
use crate::providers::{InMemoryQueueService, ServiceCall};
use crate::receiver::receiver_fn;
use serde_json::json;

fn memory() -> (InMemoryQueueService, Arc<dyn QueueServiceClient>) {
    let service = InMemoryQueueService::new();
    let client: Arc<dyn QueueServiceClient> = Arc::new(service.clone());
    (service, client)
}

fn echo_receiver() -> Arc<dyn Receiver<Message>> {
    receiver_fn(|message: Message| async move {
        Ok::<Value, HandlerError>(json!({ "body": String::from_utf8_lossy(&message.body) }))
    })
}

fn queue(
    client: Arc<dyn QueueServiceClient>,
    name: &str,
    receiver: Option<Arc<dyn Receiver<Message>>>,
) -> RegisteredQueue {
    RegisteredQueue::new(
        client,
        name,
        receiver,
        QueueOptions::default(),
        &RegistrySettings::default(),
    )
    .unwrap()
}

// ============================================================================
// Construction Tests
// ============================================================================

mod construction {
    use super::*;

    #[test]
    fn test_defaults_resolved_from_settings() {
        let (_, client) = memory();

        let queue = queue(client, "orders", None);

        assert_eq!(queue.name().as_str(), "orders");
        assert_eq!(queue.full_name().as_str(), "orders");
        assert_eq!(queue.visibility_timeout(), Duration::from_secs(60));
        assert_eq!(queue.poll_period(), Duration::from_secs(10));
        assert_eq!(queue.batch_size(), 10);
        assert!(queue.handler_timeout().is_none());
        assert!(!queue.has_receiver());
        assert!(queue.message_class().is::<Message>());
    }

    #[test]
    fn test_explicit_options_override_settings() {
        let (_, client) = memory();
        let options = QueueOptions::new()
            .with_visibility_timeout(Duration::from_secs(300))
            .with_poll_period(Duration::from_secs(2))
            .with_handler_timeout(Duration::from_secs(30));

        let queue = RegisteredQueue::<Message>::new(
            client,
            "invoices",
            None,
            options,
            &RegistrySettings::default(),
        )
        .unwrap();

        assert_eq!(queue.visibility_timeout(), Duration::from_secs(300));
        assert_eq!(queue.poll_period(), Duration::from_secs(2));
        assert_eq!(queue.handler_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_debug_mode_prefixes_full_name() {
        let (_, client) = memory();
        let settings = RegistrySettings {
            debug: true,
            queue_prefix: Some("alice".to_string()),
            ..RegistrySettings::default()
        };

        let queue = RegisteredQueue::<Message>::new(
            client,
            "orders",
            None,
            QueueOptions::default(),
            &settings,
        )
        .unwrap();

        assert_eq!(queue.name().as_str(), "orders");
        assert_eq!(queue.full_name().as_str(), "alice__orders");
    }

    #[test]
    fn test_invalid_name_is_configuration_error() {
        let (_, client) = memory();

        let result = RegisteredQueue::<Message>::new(
            client,
            "orders.fifo!",
            None,
            QueueOptions::default(),
            &RegistrySettings::default(),
        );

        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidQueueName(_))
        ));
    }

    #[test]
    fn test_excessive_visibility_timeout_is_rejected() {
        let (_, client) = memory();
        let options =
            QueueOptions::new().with_visibility_timeout(Duration::from_secs(50_000));

        let result = RegisteredQueue::<Message>::new(
            client,
            "orders",
            None,
            options,
            &RegistrySettings::default(),
        );

        assert!(matches!(result, Err(ConfigurationError::Invalid { .. })));
    }

    #[test]
    fn test_construction_performs_no_service_calls() {
        let (service, client) = memory();

        let _queue = queue(client, "orders", Some(echo_receiver()));

        assert!(service.calls().is_empty());
    }
}

// ============================================================================
// Lazy Initialization Tests
// ============================================================================

mod get_queue {
    use super::*;

    #[tokio::test]
    async fn test_first_call_creates_queue_and_binds_class() {
        let (service, client) = memory();
        let queue = queue(client, "orders", None);

        let handle = queue.get_queue().await.unwrap();

        assert_eq!(handle.name().as_str(), "orders");
        assert_eq!(
            service.calls(),
            vec![
                ServiceCall::CreateOrGetQueue {
                    queue: "orders".to_string(),
                    visibility_timeout: Duration::from_secs(60),
                },
                ServiceCall::SetMessageType {
                    queue: "orders".to_string(),
                    message_type: "message".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_repeated_calls_reuse_cached_handle() {
        let (service, client) = memory();
        let queue = queue(client, "orders", None);

        let first = queue.get_queue().await.unwrap();
        let second = queue.get_queue().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            service.count_calls(|c| matches!(c, ServiceCall::CreateOrGetQueue { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_create_once() {
        let (service, client) = memory();
        let queue = Arc::new(queue(client, "orders", None));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            tasks.push(tokio::spawn(async move { queue.get_queue().await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(
            service.count_calls(|c| matches!(c, ServiceCall::CreateOrGetQueue { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_suffix_addresses_separate_queue() {
        let (service, client) = memory();
        let queue = queue(client, "orders", None);

        let main = queue.get_queue().await.unwrap();
        let retry = queue.get_queue_for(Some("retry")).await.unwrap();

        assert_eq!(main.name().as_str(), "orders");
        assert_eq!(retry.name().as_str(), "orders__retry");
        assert_eq!(
            service.queue_names(),
            vec!["orders".to_string(), "orders__retry".to_string()]
        );
    }

    #[tokio::test]
    async fn test_invalid_suffix_rejected_before_service_call() {
        let (service, client) = memory();
        let queue = queue(client, "orders", None);

        let result = queue.get_queue_for(Some("bad suffix")).await;

        assert!(matches!(result, Err(QueueError::Validation(_))));
        assert!(service.calls().is_empty());
    }
}

// ============================================================================
// Send Tests
// ============================================================================

mod send {
    use super::*;

    #[tokio::test]
    async fn test_send_explicit_message() {
        let (service, client) = memory();
        let queue = queue(client, "orders", None);

        let message = Message::from_json(&json!({"id": 1})).unwrap();
        queue.send_message(message).await.unwrap();

        assert_eq!(service.queue_depth("orders"), 1);
    }

    #[tokio::test]
    async fn test_send_constructs_message_from_parts() {
        let (service, client) = memory();
        let queue = queue(client, "orders", None);
        let options = SendOptions::new()
            .with_attribute("kind", "created")
            .with_body(r#"{"id":7}"#);

        queue.send(None, options).await.unwrap();

        let handle = queue.get_queue().await.unwrap();
        let fetched = service.fetch_messages(&handle, 10).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].attributes.get("kind").unwrap(), "created");
        assert_eq!(fetched[0].body, Bytes::from(r#"{"id":7}"#));
    }

    #[tokio::test]
    async fn test_send_to_suffix_queue() {
        let (service, client) = memory();
        let queue = queue(client, "orders", None);

        queue
            .send(
                Some(Message::new("late")),
                SendOptions::new().with_suffix("retry"),
            )
            .await
            .unwrap();

        assert_eq!(service.queue_depth("orders__retry"), 1);
        assert_eq!(service.queue_depth("orders"), 0);
    }

    #[tokio::test]
    async fn test_send_does_not_require_receiver() {
        let (_, client) = memory();
        let queue = queue(client, "orders", None);

        assert!(queue.send_message(Message::new("x")).await.is_ok());
    }
}

// ============================================================================
// Receive Tests
// ============================================================================

mod receive {
    use super::*;

    #[tokio::test]
    async fn test_receive_without_receiver_is_not_configured() {
        let (_, client) = memory();
        let queue = queue(client, "orders", None);

        let result = queue.receive(&Message::new("x")).await;

        match result {
            Err(QueueError::NotConfigured { queue }) => assert_eq!(queue, "orders"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_receive_returns_receiver_value() {
        let (_, client) = memory();
        let queue = queue(client, "orders", Some(echo_receiver()));

        let value = queue.receive(&Message::new("hello")).await.unwrap();

        assert_eq!(value, json!({"body": "hello"}));
    }

    #[tokio::test]
    async fn test_receive_propagates_receiver_error() {
        let (_, client) = memory();
        let failing = receiver_fn(|_: Message| async move {
            Err::<Value, _>(HandlerError::failed("boom"))
        });
        let queue = queue(client, "orders", Some(failing));

        let result = queue.receive(&Message::new("x")).await;

        match result {
            Err(QueueError::Handler { queue, source }) => {
                assert_eq!(queue, "orders");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_receive_single_acknowledges_on_success() {
        let (service, client) = memory();
        let queue = queue(client, "orders", Some(echo_receiver()));
        queue.send_message(Message::new("first")).await.unwrap();
        queue.send_message(Message::new("second")).await.unwrap();

        let (received, value) = queue.receive_single().await.unwrap().unwrap();

        assert_eq!(received.message.body_text().unwrap(), "first");
        assert_eq!(received.delivery_count, 1);
        assert_eq!(value, json!({"body": "first"}));
        assert_eq!(service.queue_depth("orders"), 1);
        assert_eq!(
            service.count_calls(|c| matches!(c, ServiceCall::FetchMessages { max_count: 1, .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_receive_single_on_empty_queue() {
        let (_, client) = memory();
        let queue = queue(client, "orders", Some(echo_receiver()));

        assert!(queue.receive_single().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_receive_single_failure_leaves_message() {
        let (service, client) = memory();
        let failing = receiver_fn(|_: Message| async move {
            Err::<Value, _>(HandlerError::failed("nope"))
        });
        let queue = queue(client, "orders", Some(failing));
        queue.send_message(Message::new("x")).await.unwrap();

        let result = queue.receive_single().await;

        assert!(matches!(result, Err(QueueError::Handler { .. })));
        assert_eq!(service.queue_depth("orders"), 1);
        assert_eq!(
            service.count_calls(|c| matches!(c, ServiceCall::DeleteMessage { .. })),
            0
        );
    }

    #[tokio::test]
    async fn test_receive_single_from_suffix_queue() {
        let (service, client) = memory();
        let queue = queue(client, "orders", Some(echo_receiver()));
        queue
            .send(
                Some(Message::new("retry me")),
                SendOptions::new().with_suffix("retry"),
            )
            .await
            .unwrap();

        let (received, _) = queue
            .receive_single_from(Some("retry"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(received.message.body_text().unwrap(), "retry me");
        assert_eq!(service.queue_depth("orders__retry"), 0);
    }

    #[tokio::test]
    async fn test_receive_single_without_receiver_touches_nothing() {
        let (service, client) = memory();
        let queue = queue(client, "orders", None);

        let result = queue.receive_single().await;

        assert!(matches!(result, Err(QueueError::NotConfigured { .. })));
        assert!(service.calls().is_empty());
    }
}
