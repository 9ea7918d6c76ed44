//! Tests for queue admission and introspection, no worker involved.

use odn::config::DeliveryConfig;
use odn::queue::{DeliveryQueue, EnqueueError};
use odn::types::Priority;

fn meta(key: &str) -> serde_json::Value {
    serde_json::json!({"conversation_key": key})
}

#[test]
fn thirty_first_item_is_rejected() {
    let queue = DeliveryQueue::new(DeliveryConfig::default());

    for i in 0..30 {
        queue
            .enqueue("grp:1", &format!("msg {i}"), meta("grp:1"), Priority::Gamma)
            .expect("within capacity");
    }

    let err = queue
        .enqueue("grp:1", "one too many", meta("grp:1"), Priority::Gamma)
        .expect_err("capacity is 30");
    let EnqueueError::QueueFull {
        conversation_key,
        capacity,
    } = err;
    assert_eq!(conversation_key, "grp:1");
    assert_eq!(capacity, 30);

    // The rejection left the queue at exactly the cap.
    assert_eq!(queue.status().total_queued, 30);
}

#[test]
fn rejection_is_per_conversation() {
    let config = DeliveryConfig {
        max_queue_per_conversation: 2,
        ..DeliveryConfig::default()
    };
    let queue = DeliveryQueue::new(config);

    queue
        .enqueue("grp:1", "a", meta("grp:1"), Priority::Gamma)
        .expect("enqueue");
    queue
        .enqueue("grp:1", "b", meta("grp:1"), Priority::Gamma)
        .expect("enqueue");
    queue
        .enqueue("grp:1", "c", meta("grp:1"), Priority::Gamma)
        .expect_err("grp:1 full");

    // A different conversation still has room.
    queue
        .enqueue("grp:2", "d", meta("grp:2"), Priority::Gamma)
        .expect("grp:2 unaffected");
}

#[test]
fn receipts_carry_fresh_ids_and_depth() {
    let queue = DeliveryQueue::new(DeliveryConfig::default());

    let first = queue
        .enqueue("grp:1", "one", meta("grp:1"), Priority::Beta)
        .expect("enqueue");
    let second = queue
        .enqueue("grp:1", "two", meta("grp:1"), Priority::Beta)
        .expect("enqueue");

    assert_ne!(first.id, second.id);
    assert_eq!(first.queue_len, 1);
    assert_eq!(second.queue_len, 2);
    assert_eq!(second.conversation_key, "grp:1");
}

#[test]
fn status_reports_counts_and_config() {
    let queue = DeliveryQueue::new(DeliveryConfig::default());

    for i in 0..25 {
        let key = format!("grp:{i}");
        queue
            .enqueue(&key, "hello", meta(&key), Priority::Gamma)
            .expect("enqueue");
    }
    queue
        .enqueue("grp:0", "again", meta("grp:0"), Priority::Alpha)
        .expect("enqueue");

    let status = queue.status();
    assert_eq!(status.total_queued, 26);
    assert_eq!(status.conversation_count, 25);
    // The per-conversation listing is truncated to the first 20 in
    // first-enqueue order.
    assert_eq!(status.conversations.len(), 20);
    assert_eq!(status.conversations[0].conversation_key, "grp:0");
    assert_eq!(status.conversations[0].queued, 2);
    assert!((status.global_rps - 2.0).abs() < f64::EPSILON);
    assert_eq!(status.cooldown_ms, 1200);
    assert_eq!(status.max_queue_per_conversation, 30);
}

#[test]
fn status_serializes_for_operators() {
    let queue = DeliveryQueue::new(DeliveryConfig::default());
    queue
        .enqueue("grp:1", "hello", meta("grp:1"), Priority::Gamma)
        .expect("enqueue");

    let json = serde_json::to_value(queue.status()).expect("serialize status");
    assert_eq!(json["total_queued"], 1);
    assert_eq!(json["conversations"][0]["conversation_key"], "grp:1");
}

#[test]
fn queue_full_error_names_the_conversation() {
    let config = DeliveryConfig {
        max_queue_per_conversation: 1,
        ..DeliveryConfig::default()
    };
    let queue = DeliveryQueue::new(config);
    queue
        .enqueue("grp:9", "a", meta("grp:9"), Priority::Gamma)
        .expect("enqueue");
    let err = queue
        .enqueue("grp:9", "b", meta("grp:9"), Priority::Gamma)
        .expect_err("full");

    let text = err.to_string();
    assert!(text.contains("grp:9"), "operator-facing message: {text}");
    assert!(text.contains('1'), "capacity in message: {text}");
}
