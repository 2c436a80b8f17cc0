//! In-memory event bus.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap on poisoned locks
#![allow(clippy::missing_panics_doc)]

use catalog_core::event_bus::{BusFuture, EventBus, EventBusError, RecordStream};
use catalog_core::record::{BrokerRecord, Delivery, OutboundRecord, TopicSpec};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

#[derive(Debug, Default)]
struct BusState {
    published: Vec<OutboundRecord>,
    next_offsets: BTreeMap<String, i64>,
    topics: BTreeMap<String, TopicSpec>,
}

/// In-memory [`EventBus`].
///
/// Every published record is kept for inspection and delivered on partition 0
/// to all live subscribers of its topic. There are no consumer groups: each
/// subscription sees every record published after it was opened.
///
/// # Example
///
/// ```
/// use catalog_core::event_bus::EventBus;
/// use catalog_core::record::OutboundRecord;
/// use catalog_testing::InMemoryEventBus;
///
/// # tokio_test::block_on(async {
/// let bus = InMemoryEventBus::new();
/// bus.publish(OutboundRecord::new("product-events", b"{}".to_vec())).await.unwrap();
/// assert_eq!(bus.published_to("product-events").len(), 1);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    state: Arc<Mutex<BusState>>,
    sender: broadcast::Sender<BrokerRecord>,
    failing_publishes: Arc<AtomicUsize>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Empty bus.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            sender,
            failing_publishes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the next `count` publishes fail with [`EventBusError::PublishFailed`].
    pub fn fail_next_publishes(&self, count: usize) {
        self.failing_publishes.store(count, Ordering::SeqCst);
    }

    /// Every successfully published record, in order.
    #[must_use]
    pub fn published(&self) -> Vec<OutboundRecord> {
        self.state.lock().unwrap().published.clone()
    }

    /// Successfully published records for `topic`.
    #[must_use]
    pub fn published_to(&self, topic: &str) -> Vec<OutboundRecord> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|r| r.topic == topic)
            .cloned()
            .collect()
    }

    /// Topics created through [`EventBus::ensure_topics`].
    #[must_use]
    pub fn created_topics(&self) -> Vec<TopicSpec> {
        self.state.lock().unwrap().topics.values().cloned().collect()
    }

    /// Number of open subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn take_failure(&self) -> bool {
        self.failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, record: OutboundRecord) -> BusFuture<'_, Delivery> {
        if self.take_failure() {
            let topic = record.topic;
            return Box::pin(async move {
                Err(EventBusError::PublishFailed {
                    topic,
                    reason: "injected failure".to_string(),
                })
            });
        }

        let delivered = {
            let mut state = self.state.lock().unwrap();
            let next = state.next_offsets.entry(record.topic.clone()).or_insert(0);
            let offset = *next;
            *next += 1;
            state.published.push(record.clone());
            BrokerRecord {
                topic: record.topic,
                partition: 0,
                offset,
                key: record.key,
                payload: record.payload,
                headers: record.headers,
                timestamp: Some(Utc::now()),
            }
        };

        let delivery = Delivery {
            partition: delivered.partition,
            offset: delivered.offset,
        };
        // No subscribers is not an error
        let _ = self.sender.send(delivered);
        Box::pin(async move { Ok(delivery) })
    }

    fn subscribe(&self, topics: &[&str]) -> BusFuture<'_, RecordStream> {
        let topics: HashSet<String> = topics.iter().map(|t| (*t).to_string()).collect();
        let mut rx = self.sender.subscribe();

        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(record) if topics.contains(&record.topic) => yield Ok(record),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {},
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Box::pin(async move { Ok(Box::pin(stream) as RecordStream) })
    }

    fn list_topics(&self) -> BusFuture<'_, Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state
            .topics
            .keys()
            .chain(state.next_offsets.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        Box::pin(async move { Ok(names) })
    }

    fn ensure_topics(&self, specs: &[TopicSpec]) -> BusFuture<'_, ()> {
        let mut state = self.state.lock().unwrap();
        for spec in specs {
            state
                .topics
                .entry(spec.name.clone())
                .or_insert_with(|| spec.clone());
        }
        Box::pin(async move { Ok(()) })
    }
}
