//! Kafka-compatible event bus for the product catalog.
//!
//! [`RedpandaEventBus`] implements [`EventBus`] on top of rdkafka. It works
//! against Redpanda, Apache Kafka or any other broker speaking the Kafka
//! protocol.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - Offsets are committed AFTER a record has been handed to the subscriber's channel
//! - If the process crashes before commit, the record is redelivered
//! - Ordering is guaranteed within a partition; product events are keyed by
//!   product id so every change to one product lands on the same partition
//!
//! **Configuration options**:
//! - `consumer_group`: group joined by every `subscribe` call (default: `catalog-service`)
//! - `buffer_size`: records buffered between the broker and the handler (default: 500)
//! - `auto_offset_reset`: where a new group starts reading (default: `earliest`)
//!
//! # Example
//!
//! ```no_run
//! use catalog_core::event_bus::EventBus;
//! use catalog_core::record::OutboundRecord;
//! use catalog_redpanda::RedpandaEventBus;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("catalog-dashboard")
//!     .build()?;
//!
//! bus.publish(OutboundRecord::new("product-events", br#"{"productId":1}"#.to_vec()).with_key("1"))
//!     .await?;
//!
//! let mut stream = bus.subscribe(&["product-events"]).await?;
//! while let Some(record) = stream.next().await {
//!     let record = record?;
//!     println!("{}@{}: {} bytes", record.topic, record.offset, record.payload.len());
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use catalog_core::event_bus::{BusFuture, EventBus, EventBusError, RecordStream};
use catalog_core::record::{BrokerRecord, Delivery, OutboundRecord, TopicSpec};
use chrono::{DateTime, Utc};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use std::time::Duration;

/// Default consumer group.
pub const DEFAULT_CONSUMER_GROUP: &str = "catalog-service";

/// Default number of buffered records per subscription.
pub const DEFAULT_BUFFER_SIZE: usize = 500;

/// rdkafka-backed event bus.
///
/// One producer is shared by every publish; each `subscribe` call creates a
/// fresh `StreamConsumer` in the configured group, so N calls give N members
/// that split the topic's partitions between them.
///
/// # Example
///
/// ```no_run
/// use catalog_redpanda::RedpandaEventBus;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .timeout(Duration::from_secs(10))
///     .buffer_size(500)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    /// Kafka producer for publishing records
    producer: FutureProducer,
    /// Broker addresses (for consumers and admin clients)
    brokers: String,
    /// Producer and metadata timeout
    timeout: Duration,
    /// Consumer group joined by subscriptions
    consumer_group: String,
    /// Record buffer size for subscribers
    buffer_size: usize,
    /// Auto offset reset policy
    auto_offset_reset: String,
}

impl RedpandaEventBus {
    /// Create an event bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Broker addresses.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Consumer group joined by subscriptions.
    #[must_use]
    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    fn admin_client(&self) -> Result<AdminClient<DefaultClientContext>, EventBusError> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()
            .map_err(|e| EventBusError::AdminFailed(format!("Failed to create admin client: {e}")))
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated `host:port` list).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"1"`
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec (`none`, `gzip`, `snappy`, `lz4`, `zstd`).
    ///
    /// Default: `"none"`
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send and metadata timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group joined by subscriptions.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set how many records may be buffered between the broker and the subscriber.
    ///
    /// Zero is treated as one.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Set where a new consumer group starts reading: `earliest`, `latest` or `error`.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are not set or the
    /// producer cannot be created.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let acks = self.producer_acks.as_deref().unwrap_or("1");
        let compression = self.compression.as_deref().unwrap_or("none");
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| EventBusError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        let consumer_group = self
            .consumer_group
            .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.to_string());
        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "earliest".to_string());

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            consumer_group = %consumer_group,
            buffer_size,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaEventBus created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout,
            consumer_group,
            buffer_size,
            auto_offset_reset,
        })
    }
}

fn owned_headers(headers: &[(String, String)]) -> OwnedHeaders {
    headers
        .iter()
        .fold(OwnedHeaders::new_with_capacity(headers.len()), |acc, (key, value)| {
            acc.insert(Header {
                key: key.as_str(),
                value: Some(value.as_bytes()),
            })
        })
}

/// Copy a borrowed rdkafka message into a broker-neutral record.
///
/// Non UTF-8 keys and header values are dropped.
fn to_broker_record(message: &BorrowedMessage<'_>) -> BrokerRecord {
    let headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .filter_map(|h| {
                    let value = std::str::from_utf8(h.value?).ok()?;
                    Some((h.key.to_string(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    BrokerRecord {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(str::to_string),
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        headers,
        timestamp: message
            .timestamp()
            .to_millis()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(&self, record: OutboundRecord) -> BusFuture<'_, Delivery> {
        let timeout = self.timeout;

        Box::pin(async move {
            let mut kafka_record = FutureRecord::to(&record.topic)
                .payload(&record.payload)
                .headers(owned_headers(&record.headers));
            if let Some(key) = &record.key {
                kafka_record = kafka_record.key(key);
            }

            match self.producer.send(kafka_record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %record.topic,
                        key = ?record.key,
                        partition,
                        offset,
                        "Record published"
                    );
                    Ok(Delivery { partition, offset })
                },
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %record.topic,
                        error = %kafka_error,
                        "Failed to publish record"
                    );
                    Err(EventBusError::PublishFailed {
                        topic: record.topic.clone(),
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }

    fn subscribe(&self, topics: &[&str]) -> BusFuture<'_, RecordStream> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let brokers = self.brokers.clone();
        let consumer_group = self.consumer_group.clone();
        let buffer_size = self.buffer_size;
        let auto_offset_reset = self.auto_offset_reset.clone();

        Box::pin(async move {
            // Manual commit for at-least-once
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &consumer_group)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %consumer_group,
                buffer_size,
                auto_offset_reset = %auto_offset_reset,
                "Subscribed to topics"
            );

            let (tx, rx) = tokio::sync::mpsc::channel(buffer_size);

            // The task owns the consumer and forwards records into the channel
            tokio::spawn(async move {
                use futures::StreamExt;
                use rdkafka::consumer::CommitMode;

                let mut stream = consumer.stream();

                while let Some(msg_result) = stream.next().await {
                    match msg_result {
                        Ok(message) => {
                            let record = to_broker_record(&message);
                            tracing::trace!(
                                topic = %record.topic,
                                partition = record.partition,
                                offset = record.offset,
                                "Received record"
                            );

                            if tx.send(Ok(record)).await.is_err() {
                                tracing::debug!("Channel receiver dropped, exiting consumer task");
                                break; // exit WITHOUT committing
                            }

                            // Commit only after the record reached the channel
                            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                tracing::warn!(
                                    topic = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    error = %e,
                                    "Failed to commit offset (record may be redelivered)"
                                );
                            }
                        },
                        Err(e) => {
                            let err = EventBusError::TransportError(format!(
                                "Failed to receive message: {e}"
                            ));
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                        },
                    }
                }

                tracing::debug!("Consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as RecordStream)
        })
    }

    fn list_topics(&self) -> BusFuture<'_, Vec<String>> {
        let producer = self.producer.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            // fetch_metadata blocks the calling thread
            let metadata = tokio::task::spawn_blocking(move || {
                producer
                    .client()
                    .fetch_metadata(None, Timeout::After(timeout))
                    .map(|metadata| {
                        metadata
                            .topics()
                            .iter()
                            .map(|topic| topic.name().to_string())
                            .collect::<Vec<_>>()
                    })
            })
            .await
            .map_err(|e| EventBusError::AdminFailed(format!("Metadata task failed: {e}")))?;

            metadata.map_err(|e| EventBusError::AdminFailed(format!("Failed to fetch metadata: {e}")))
        })
    }

    fn ensure_topics(&self, specs: &[TopicSpec]) -> BusFuture<'_, ()> {
        let specs = specs.to_vec();

        Box::pin(async move {
            let admin = self.admin_client()?;
            let new_topics: Vec<NewTopic<'_>> = specs
                .iter()
                .map(|spec| {
                    NewTopic::new(
                        &spec.name,
                        spec.partitions,
                        TopicReplication::Fixed(spec.replication),
                    )
                })
                .collect();

            let results = admin
                .create_topics(&new_topics, &AdminOptions::new())
                .await
                .map_err(|e| EventBusError::AdminFailed(format!("Failed to create topics: {e}")))?;

            for result in results {
                match result {
                    Ok(name) => tracing::info!(topic = %name, "Topic created"),
                    Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                        tracing::debug!(topic = %name, "Topic already exists");
                    },
                    Err((name, code)) => {
                        return Err(EventBusError::AdminFailed(format!(
                            "Failed to create topic '{name}': {code}"
                        )));
                    },
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redpanda_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventBus>();
        assert_sync::<RedpandaEventBus>();
    }

    #[test]
    fn build_without_brokers_fails() {
        let result = RedpandaEventBus::builder().build();
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));
    }

    #[test]
    fn zero_buffer_size_is_clamped() {
        let builder = RedpandaEventBus::builder().buffer_size(0);
        assert_eq!(builder.buffer_size, Some(1));
    }

    #[test]
    fn headers_are_carried_over() {
        let headers = owned_headers(&[
            ("dlt-original-topic".to_string(), "product-events".to_string()),
            ("dlt-original-offset".to_string(), "7".to_string()),
        ]);
        assert_eq!(headers.count(), 2);
        let first = headers.get(0);
        assert_eq!(first.key, "dlt-original-topic");
        assert_eq!(first.value, Some("product-events".as_bytes()));
    }
}
