//! Tests for queue naming.

use super::*;

#[test]
fn test_queue_name_validation() {
    assert!(QueueName::new("orders").is_ok());
    assert!(QueueName::new("orders_v2-eu").is_ok());

    assert!(QueueName::new("").is_err());
    assert!(QueueName::new("a".repeat(81)).is_err());
    assert!(QueueName::new("a".repeat(80)).is_ok());
    assert!(QueueName::new("orders.fifo").is_err());
    assert!(QueueName::new("orders queue").is_err());
    assert!(QueueName::new("-orders").is_err());
    assert!(QueueName::new("orders-").is_err());
}

#[test]
fn test_full_name_in_production_is_logical_name() {
    for name in ["orders", "billing__charge", "a"] {
        let queue_name = QueueName::new(name).unwrap();
        let full = full_queue_name(&queue_name, &NamingMode::Production).unwrap();
        assert_eq!(full.as_str(), name);
    }
}

#[test]
fn test_full_name_in_prefixed_mode() {
    for (prefix, name) in [("dev", "orders"), ("staging", "emails"), ("ci-42", "x")] {
        let queue_name = QueueName::new(name).unwrap();
        let mode = NamingMode::Prefixed(prefix.to_string());

        let full = full_queue_name(&queue_name, &mode).unwrap();

        assert_eq!(full.as_str(), format!("{}__{}", prefix, name));
    }
}

#[test]
fn test_full_name_is_deterministic() {
    let name = QueueName::new("orders").unwrap();
    let mode = NamingMode::Prefixed("dev".to_string());

    assert_eq!(
        full_queue_name(&name, &mode).unwrap(),
        full_queue_name(&name, &mode).unwrap()
    );
}

#[test]
fn test_full_name_rejects_overlong_result() {
    let name = QueueName::new("a".repeat(78)).unwrap();
    let mode = NamingMode::Prefixed("dev".to_string());

    assert!(full_queue_name(&name, &mode).is_err());
}

#[test]
fn test_suffix_appends_segment() {
    let name = QueueName::new("dev__orders").unwrap();

    assert_eq!(name.with_suffix("eu").unwrap().as_str(), "dev__orders__eu");
    assert!(name.with_suffix("").is_err());
    assert!(name.with_suffix("eu west").is_err());
}

#[test]
fn test_derive_queue_name_from_module_and_function() {
    assert_eq!(
        derive_queue_name("billing::handlers", "charge"),
        "billing__handlers__charge"
    );
    assert_eq!(derive_queue_name("app", "notify"), "app__notify");
}

#[test]
fn test_handler_origin_macro_captures_location() {
    fn process_refund() {}
    process_refund();

    let origin = crate::handler_origin!(process_refund);

    assert_eq!(origin.function, "process_refund");
    assert_eq!(origin.module_path, module_path!());
    assert_eq!(
        origin.queue_name(),
        format!("{}__process_refund", module_path!().replace("::", "__"))
    );
}
