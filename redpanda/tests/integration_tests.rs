//! Integration tests for [`RedpandaEventBus`] against a real Kafka broker.
//!
//! Marked `#[ignore]`: they need Docker (testcontainers) and take tens of
//! seconds each to start the broker.
//!
//! ```bash
//! cargo test -p catalog-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use catalog_core::event_bus::EventBus;
use catalog_core::record::{OutboundRecord, TopicSpec};
use catalog_redpanda::RedpandaEventBus;
use futures::StreamExt;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");
    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    (kafka, format!("{host}:{port}"))
}

fn bus(brokers: &str, group: &str) -> RedpandaEventBus {
    RedpandaEventBus::builder()
        .brokers(brokers)
        .consumer_group(group)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus")
}

/// Wait until the broker accepts writes.
async fn wait_for_kafka_ready(bus: &RedpandaEventBus) {
    for attempt in 1..=60 {
        if bus
            .publish(OutboundRecord::new("warmup-topic", b"{}".to_vec()))
            .await
            .is_ok()
        {
            tokio::time::sleep(Duration::from_millis(500)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(attempt != 60, "Kafka failed to become ready");
    }
}

#[tokio::test]
#[ignore]
async fn test_publish_and_subscribe_round_trip() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = bus(&brokers, "round-trip");
    wait_for_kafka_ready(&bus).await;
    bus.ensure_topics(&[TopicSpec::new("product-events", 3, 1)])
        .await
        .expect("Failed to create topic");

    let mut stream = bus
        .subscribe(&["product-events"])
        .await
        .expect("Failed to subscribe");

    let record = OutboundRecord::new(
        "product-events",
        br#"{"eventType":"CREATED","productId":4}"#.to_vec(),
    )
    .with_key("4")
    .with_header("source", "test");
    let delivery = bus.publish(record).await.expect("Failed to publish");
    assert!(delivery.offset >= 0);

    let received = tokio::time::timeout(Duration::from_secs(30), stream.next())
        .await
        .expect("Timed out waiting for record")
        .expect("Stream ended")
        .expect("Transport error");

    assert_eq!(received.topic, "product-events");
    assert_eq!(received.key.as_deref(), Some("4"));
    assert_eq!(received.partition, delivery.partition);
    assert_eq!(received.offset, delivery.offset);
    assert_eq!(received.header("source"), Some("test"));
    let json: serde_json::Value =
        serde_json::from_slice(&received.payload).expect("Payload is JSON");
    assert_eq!(json["productId"], 4);
}

#[tokio::test]
#[ignore]
async fn test_ensure_topics_is_idempotent_and_listed() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = bus(&brokers, "admin");
    wait_for_kafka_ready(&bus).await;

    let specs = [
        TopicSpec::new("product-events", 3, 1),
        TopicSpec::new("product-events.DLT", 1, 1),
    ];
    bus.ensure_topics(&specs).await.expect("First create failed");
    bus.ensure_topics(&specs).await.expect("Second create failed");

    let topics = bus.list_topics().await.expect("Failed to list topics");
    assert!(topics.iter().any(|t| t == "product-events"));
    assert!(topics.iter().any(|t| t == "product-events.DLT"));
}

#[tokio::test]
#[ignore]
async fn test_records_with_same_key_keep_order() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = bus(&brokers, "ordering");
    wait_for_kafka_ready(&bus).await;
    bus.ensure_topics(&[TopicSpec::new("ordered", 3, 1)])
        .await
        .expect("Failed to create topic");

    let mut stream = bus.subscribe(&["ordered"]).await.expect("Failed to subscribe");

    for i in 0..5 {
        let payload = format!(r#"{{"seq":{i}}}"#).into_bytes();
        bus.publish(OutboundRecord::new("ordered", payload).with_key("same"))
            .await
            .expect("Failed to publish");
    }

    let mut seen = Vec::new();
    while seen.len() < 5 {
        let record = tokio::time::timeout(Duration::from_secs(30), stream.next())
            .await
            .expect("Timed out waiting for record")
            .expect("Stream ended")
            .expect("Transport error");
        let json: serde_json::Value =
            serde_json::from_slice(&record.payload).expect("Payload is JSON");
        seen.push(json["seq"].as_i64().expect("seq"));
    }
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
}
