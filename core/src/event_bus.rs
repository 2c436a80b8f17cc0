//! Event bus abstraction for product change events.
//!
//! Mutations publish to the bus after the write is committed; the dashboard
//! consumer subscribes and fans records out to live subscribers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    Mutation     │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  1. Postgres    │◄─── Source of truth
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ 2. Publish to   │
//! │  product-events │◄─── At-least-once delivery
//! └────────┬────────┘
//!          │
//!     ┌────┴─────────┐
//!     ▼              ▼
//! ┌─────────┐  ┌───────────────┐
//! │Dashboard│  │product-events │
//! │ relay   │  │     .DLT      │◄─── after retries are exhausted
//! └─────────┘  └───────────────┘
//! ```
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `catalog-testing` - for tests
//! - `RedpandaEventBus` in `catalog-redpanda` - Kafka-compatible brokers

use crate::record::{BrokerRecord, Delivery, OutboundRecord, TopicSpec};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a record to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Topic administration (list/create) failed
    #[error("Admin operation failed: {0}")]
    AdminFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of consumed records.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<BrokerRecord, EventBusError>> + Send>>;

/// Boxed future returned by [`EventBus`] methods.
pub type BusFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EventBusError>> + Send + 'a>>;

/// Publish/subscribe access to a Kafka-compatible broker.
///
/// All implementations must be `Send + Sync`; a single bus is shared by every
/// request handler and consumer task.
///
/// # Delivery
///
/// - **At-least-once**: subscribers may see a record more than once
/// - **Ordered within partition**: records with the same key keep their order
/// - **Consumer groups**: each `subscribe` call joins the bus's configured group,
///   so calling it N times spreads partitions across N consumers
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` so the bus can be shared as
/// `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Publish a record.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker rejects the record
    /// or the send times out.
    fn publish(&self, record: OutboundRecord) -> BusFuture<'_, Delivery>;

    /// Subscribe to one or more topics.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the consumer cannot be
    /// created or the subscription is refused.
    fn subscribe(&self, topics: &[&str]) -> BusFuture<'_, RecordStream>;

    /// List topic names known to the broker, internal ones included.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::AdminFailed`] if metadata cannot be fetched.
    fn list_topics(&self) -> BusFuture<'_, Vec<String>>;

    /// Create any of `specs` that do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::AdminFailed`] if creation fails for a reason
    /// other than the topic already existing.
    fn ensure_topics(&self, specs: &[TopicSpec]) -> BusFuture<'_, ()>;
}
