//! Named in-process multicast channels.
//!
//! Each topic owns a bounded `tokio::sync::broadcast` channel created on first
//! use. Subscribers only see items published after they subscribed; a
//! subscriber that falls more than `capacity` items behind skips the overflow.
//!
//! ```text
//! ProductService ──► "productCreated" ──► GraphQL subscription streams
//!                ──► "productUpdated" ──►
//! DashboardRelay ──► "/topic/events"  ──► dashboard WebSockets
//! ```

use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

/// Default per-topic buffer.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Type alias for the channels map to reduce complexity.
type ChannelsMap<T> = Arc<RwLock<HashMap<String, broadcast::Sender<(String, T)>>>>;

/// Stream of items published to one topic.
pub type TopicStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Topic broadcaster.
///
/// Cloning is cheap; clones share the same channels.
///
/// # Example
///
/// ```
/// use catalog_runtime::broadcast::TopicBroadcaster;
///
/// # tokio_test::block_on(async {
/// let broadcaster = TopicBroadcaster::<String>::new();
/// let mut rx = broadcaster.subscribe("news").await;
///
/// broadcaster.publish("news", "hello".to_string()).await;
///
/// let (topic, item) = rx.recv().await.unwrap();
/// assert_eq!(topic, "news");
/// assert_eq!(item, "hello");
/// # });
/// ```
pub struct TopicBroadcaster<T>
where
    T: Clone + Send + 'static,
{
    channels: ChannelsMap<T>,
    capacity: usize,
}

impl<T> TopicBroadcaster<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a broadcaster with [`DEFAULT_CAPACITY`] per topic.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a broadcaster buffering `capacity` items per topic (at least 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Publish `item` to `topic`.
    ///
    /// Returns the number of subscribers that will receive it; zero is fine.
    pub async fn publish(&self, topic: impl Into<String>, item: T) -> usize {
        let topic = topic.into();
        let mut channels = self.channels.write().await;
        let sender = channels
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0);

        sender.send((topic, item)).unwrap_or(0)
    }

    /// Subscribe to `topic`.
    pub async fn subscribe(&self, topic: impl Into<String>) -> broadcast::Receiver<(String, T)> {
        let mut channels = self.channels.write().await;
        let sender = channels
            .entry(topic.into())
            .or_insert_with(|| broadcast::channel(self.capacity).0);

        sender.subscribe()
    }

    /// Subscribe to `topic` as a stream of items.
    ///
    /// Lagged items are skipped with a warning; the stream ends only when the
    /// broadcaster is dropped.
    pub async fn stream(&self, topic: impl Into<String>) -> TopicStream<T> {
        let topic = topic.into();
        let mut rx = self.subscribe(topic.clone()).await;

        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok((_, item)) => yield item,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(topic = %topic, skipped, "Subscriber lagging, skipped items");
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Get count of active topics.
    pub async fn topic_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Live subscribers of `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.channels
            .read()
            .await
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

impl<T> Default for TopicBroadcaster<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TopicBroadcaster<T>
where
    T: Clone + Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
            capacity: self.capacity,
        }
    }
}

impl<T> std::fmt::Debug for TopicBroadcaster<T>
where
    T: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicBroadcaster")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_topic_broadcaster_creation() {
        let broadcaster = TopicBroadcaster::<String>::new();
        assert_eq!(broadcaster.topic_count().await, 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let broadcaster = TopicBroadcaster::<String>::new();

        let mut rx1 = broadcaster.subscribe("test").await;
        let mut rx2 = broadcaster.subscribe("test").await;

        assert_eq!(broadcaster.publish("test", "Message".to_string()).await, 2);

        let (_, msg1) = rx1.recv().await.expect("rx1 should receive");
        let (_, msg2) = rx2.recv().await.expect("rx2 should receive");
        assert_eq!(msg1, "Message");
        assert_eq!(msg2, "Message");
    }

    #[tokio::test]
    async fn test_topic_isolation() {
        let broadcaster = TopicBroadcaster::<String>::new();

        let mut rx_a = broadcaster.subscribe("topic_a").await;
        let mut rx_b = broadcaster.subscribe("topic_b").await;

        broadcaster.publish("topic_a", "MessageA".to_string()).await;

        let (_, msg) = rx_a.recv().await.expect("rx_a should receive");
        assert_eq!(msg, "MessageA");
        assert!(rx_b.try_recv().is_err());
        assert_eq!(broadcaster.topic_count().await, 2);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_not_an_error() {
        let broadcaster = TopicBroadcaster::<u32>::new();
        assert_eq!(broadcaster.publish("empty", 1).await, 0);
        assert_eq!(broadcaster.subscriber_count("empty").await, 0);
    }

    #[tokio::test]
    async fn late_subscribers_miss_earlier_items() {
        let broadcaster = TopicBroadcaster::<u32>::new();
        broadcaster.publish("t", 1).await;

        let mut stream = broadcaster.stream("t").await;
        broadcaster.publish("t", 2).await;

        assert_eq!(stream.next().await, Some(2));
    }

    #[tokio::test]
    async fn lagging_stream_skips_overflow() {
        let broadcaster = TopicBroadcaster::<u32>::with_capacity(2);
        let mut stream = broadcaster.stream("t").await;

        for n in 0..5 {
            broadcaster.publish("t", n).await;
        }

        // Only the last `capacity` items survive
        assert_eq!(stream.next().await, Some(3));
        assert_eq!(stream.next().await, Some(4));
    }
}
