//! Integration tests for queue registration and send-by-name
//!
//! These tests verify:
//! - Full names follow the naming mode for every registered queue
//! - Invalid message classes fail at registration, never later
//! - Mismatched sends never reach the queue service
//! - Queue creation is memoized per registered queue

mod common;

use common::{memory_registry, BadlyTagged, JsonEvent, RecordingReceiver};
use queue_registry::{
    ConfigurationError, Message, QueueError, QueueOptions, RegistrySettings, SendOptions,
    ServiceCall,
};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_full_names_follow_naming_mode() {
    let names = ["orders", "billing__charge", "a", "shipping-events"];

    let (_, production) = memory_registry(RegistrySettings::default());
    for name in names {
        let queue = production
            .register::<Message>(name, None, QueueOptions::default())
            .unwrap();
        assert_eq!(queue.full_name().as_str(), name);
    }

    for prefix in ["dev", "alice", "ci-42"] {
        let (_, prefixed) = memory_registry(RegistrySettings {
            debug: true,
            queue_prefix: Some(prefix.to_string()),
            ..RegistrySettings::default()
        });
        for name in names {
            let queue = prefixed
                .register::<Message>(name, None, QueueOptions::default())
                .unwrap();
            assert_eq!(queue.full_name().as_str(), format!("{}__{}", prefix, name));
            assert_eq!(queue.name().as_str(), name);
        }
    }
}

#[test]
fn test_prefix_ignored_outside_debug_mode() {
    let (_, registry) = memory_registry(RegistrySettings {
        debug: false,
        queue_prefix: Some("dev".to_string()),
        ..RegistrySettings::default()
    });

    let queue = registry
        .register::<Message>("orders", None, QueueOptions::default())
        .unwrap();

    assert_eq!(queue.full_name().as_str(), "orders");
}

#[test]
fn test_invalid_message_class_fails_at_registration() {
    let (service, registry) = memory_registry(RegistrySettings::default());

    let result = registry.register::<BadlyTagged>("tagged", None, QueueOptions::default());

    assert!(matches!(
        result,
        Err(ConfigurationError::InvalidMessageClass { .. })
    ));
    assert!(!registry.contains("tagged"));
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_mismatched_send_never_reaches_service() {
    let (service, registry) = memory_registry(RegistrySettings::default());
    registry
        .register::<JsonEvent>("events", None, QueueOptions::default())
        .unwrap();

    let result = registry
        .send("events", Some(Message::new("{}")), SendOptions::default())
        .await;

    assert!(matches!(result, Err(QueueError::TypeMismatch { .. })));
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_untyped_send_uses_registered_class_constructor() {
    let (service, registry) = memory_registry(RegistrySettings::default());
    registry
        .register::<JsonEvent>("events", None, QueueOptions::default())
        .unwrap();

    let accepted = registry
        .send_attributes("events", SendOptions::new().with_body(r#"{"id":1}"#))
        .await;
    let rejected = registry
        .send_attributes("events", SendOptions::new().with_body("[1, 2]"))
        .await;

    assert!(accepted.is_ok());
    assert!(matches!(rejected, Err(QueueError::Serialization(_))));
    assert_eq!(service.queue_depth("events"), 1);
}

#[tokio::test]
async fn test_get_queue_memoized_across_many_calls() {
    let (service, registry) = memory_registry(RegistrySettings::default());
    let queue = registry
        .register::<Message>("orders", None, QueueOptions::default())
        .unwrap();

    for _ in 0..25 {
        queue.get_queue().await.unwrap();
    }
    for _ in 0..5 {
        queue.send_message(Message::new("x")).await.unwrap();
    }

    assert_eq!(
        service.count_calls(|c| matches!(c, ServiceCall::CreateOrGetQueue { .. })),
        1
    );
    assert_eq!(
        service.count_calls(|c| matches!(c, ServiceCall::SetMessageType { .. })),
        1
    );
}

#[tokio::test]
async fn test_explicit_visibility_timeout_reaches_service() {
    let (service, registry) = memory_registry(RegistrySettings::default());
    let queue = registry
        .register::<Message>(
            "slow-jobs",
            Some(Arc::new(RecordingReceiver::new())),
            QueueOptions::new().with_visibility_timeout(Duration::from_secs(900)),
        )
        .unwrap();

    queue.get_queue().await.unwrap();

    assert_eq!(
        service.visibility_timeout("slow-jobs"),
        Some(Duration::from_secs(900))
    );
    assert_eq!(
        service.message_class("slow-jobs").map(|c| c.message_type()),
        Some("message")
    );
}
