//! Broker consumer with automatic reconnection.
//!
//! [`EventConsumer`] owns the subscribe-process-reconnect loop; what happens to
//! each record is up to a [`RecordHandler`].
//!
//! ```text
//! loop {
//!     subscribe(topics)            ── failure: wait retry_delay, try again
//!     for record in stream {
//!         handler.handle(record)   ── error: log, keep going
//!     }
//!     stream ended: wait retry_delay, resubscribe
//! }
//! ```
//!
//! Every loop checks the shutdown signal, so a consumer exits cleanly once it
//! is sent.
//!
//! # Example
//!
//! ```rust,ignore
//! let consumer = EventConsumer::builder()
//!     .name("dashboard")
//!     .topics(vec!["product-events".to_string()])
//!     .event_bus(event_bus)
//!     .handler(handler)
//!     .shutdown(shutdown_rx)
//!     .build()?;
//!
//! let handles = consumer.spawn_group(3);
//! ```

use catalog_core::event_bus::{EventBus, EventBusError};
use catalog_core::record::BrokerRecord;
use futures::StreamExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Errors a [`RecordHandler`] can report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Processing may succeed if tried again.
    #[error("Retryable handler error: {0}")]
    Retryable(String),

    /// Processing will never succeed for this record.
    #[error("Fatal handler error: {0}")]
    Fatal(String),
}

impl HandlerError {
    /// Whether a retry makes sense.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Boxed future returned by [`RecordHandler::handle`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;

/// Processes one consumed record.
pub trait RecordHandler: Send + Sync {
    /// Handle `record`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if the record could not be processed.
    fn handle<'a>(&'a self, record: &'a BrokerRecord) -> HandlerFuture<'a>;
}

/// Errors building an [`EventConsumer`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerBuildError {
    /// A required builder field was not set.
    #[error("{0} is required")]
    Missing(&'static str),
}

/// Broker consumer.
///
/// # Configuration
///
/// - `name`: label for log lines
/// - `topics`: topics to subscribe to
/// - `event_bus`: bus to consume from (its consumer group applies)
/// - `handler`: processes each record
/// - `shutdown`: broadcast receiver for graceful shutdown
/// - `retry_delay`: wait before resubscribing (default: 5s)
pub struct EventConsumer {
    name: String,
    topics: Vec<String>,
    event_bus: Arc<dyn EventBus>,
    handler: Arc<dyn RecordHandler>,
    shutdown: broadcast::Receiver<()>,
    retry_delay: Duration,
}

impl EventConsumer {
    /// Create a consumer with the default retry delay.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        topics: Vec<String>,
        event_bus: Arc<dyn EventBus>,
        handler: Arc<dyn RecordHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            name: name.into(),
            topics,
            event_bus,
            handler,
            shutdown,
            retry_delay: Duration::from_secs(5),
        }
    }

    /// Create a builder for configuring a consumer.
    #[must_use]
    pub fn builder() -> EventConsumerBuilder {
        EventConsumerBuilder::default()
    }

    /// Set custom retry delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Consumer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the consumer as a background task.
    #[must_use]
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Spawn `concurrency` copies of this consumer (at least one).
    ///
    /// The copies share the bus, handler and shutdown signal. On a broker
    /// with consumer groups they split the topic's partitions between them.
    #[must_use]
    pub fn spawn_group(self, concurrency: usize) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(concurrency.max(1));
        for index in 1..concurrency.max(1) {
            let copy = Self {
                name: format!("{}-{index}", self.name),
                topics: self.topics.clone(),
                event_bus: Arc::clone(&self.event_bus),
                handler: Arc::clone(&self.handler),
                shutdown: self.shutdown.resubscribe(),
                retry_delay: self.retry_delay,
            };
            handles.push(copy.spawn());
        }
        handles.push(self.spawn());
        handles
    }

    async fn run(&mut self) {
        info!(consumer = %self.name, topics = ?self.topics, "Event consumer started");

        loop {
            let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Event consumer received shutdown signal");
                    break;
                }
                subscribe_result = self.event_bus.subscribe(&topics) => {
                    match subscribe_result {
                        Ok(mut stream) => {
                            info!(consumer = %self.name, topics = ?self.topics, "Subscribed to event bus");

                            if self.process_stream(&mut stream).await {
                                break;
                            }

                            warn!(consumer = %self.name, "Event stream ended, reconnecting in {:?}", self.retry_delay);
                        }
                        Err(e) => {
                            error!(
                                consumer = %self.name,
                                error = %e,
                                "Failed to subscribe to event bus, retrying in {:?}",
                                self.retry_delay
                            );
                        }
                    }
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Event consumer received shutdown signal while waiting to reconnect");
                    break;
                }
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        info!(consumer = %self.name, "Event consumer stopped");
    }

    /// Returns `true` when shutdown was requested, `false` when the stream ended.
    async fn process_stream<S>(&mut self, stream: &mut S) -> bool
    where
        S: futures::Stream<Item = Result<BrokerRecord, EventBusError>> + Unpin + Send,
    {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Event consumer received shutdown signal during processing");
                    return true;
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(record)) => {
                            if let Err(e) = self.handler.handle(&record).await {
                                error!(
                                    consumer = %self.name,
                                    topic = %record.topic,
                                    partition = record.partition,
                                    offset = record.offset,
                                    error = %e,
                                    "Failed to handle record"
                                );
                            }
                        }
                        Some(Err(e)) => {
                            error!(consumer = %self.name, error = %e, "Error receiving record from stream");
                        }
                        None => return false,
                    }
                }
            }
        }
    }
}

/// Builder for configuring an [`EventConsumer`].
#[derive(Default)]
pub struct EventConsumerBuilder {
    name: Option<String>,
    topics: Option<Vec<String>>,
    event_bus: Option<Arc<dyn EventBus>>,
    handler: Option<Arc<dyn RecordHandler>>,
    shutdown: Option<broadcast::Receiver<()>>,
    retry_delay: Option<Duration>,
}

impl EventConsumerBuilder {
    /// Set consumer name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set topics to subscribe to.
    #[must_use]
    pub fn topics(mut self, topics: Vec<String>) -> Self {
        self.topics = Some(topics);
        self
    }

    /// Set event bus instance.
    #[must_use]
    pub fn event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Set record handler.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn RecordHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set shutdown signal receiver.
    #[must_use]
    pub fn shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Set custom retry delay (default: 5 seconds).
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Build the [`EventConsumer`].
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerBuildError::Missing`] if name, topics, event bus,
    /// handler or shutdown is not set.
    pub fn build(self) -> Result<EventConsumer, ConsumerBuildError> {
        Ok(EventConsumer {
            name: self.name.ok_or(ConsumerBuildError::Missing("name"))?,
            topics: self.topics.ok_or(ConsumerBuildError::Missing("topics"))?,
            event_bus: self.event_bus.ok_or(ConsumerBuildError::Missing("event_bus"))?,
            handler: self.handler.ok_or(ConsumerBuildError::Missing("handler"))?,
            shutdown: self.shutdown.ok_or(ConsumerBuildError::Missing("shutdown"))?,
            retry_delay: self.retry_delay.unwrap_or_else(|| Duration::from_secs(5)),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use catalog_core::record::OutboundRecord;
    use catalog_testing::InMemoryEventBus;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct Collecting {
        tx: mpsc::UnboundedSender<BrokerRecord>,
        fail_on: Option<Vec<u8>>,
    }

    impl RecordHandler for Collecting {
        fn handle<'a>(&'a self, record: &'a BrokerRecord) -> HandlerFuture<'a> {
            Box::pin(async move {
                if self.fail_on.as_deref() == Some(record.payload.as_slice()) {
                    return Err(HandlerError::Fatal("poison".into()));
                }
                let _ = self.tx.send(record.clone());
                Ok(())
            })
        }
    }

    async fn wait_for_subscribers(bus: &InMemoryEventBus, count: usize) {
        for _ in 0..200 {
            if bus.subscriber_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("consumers did not subscribe in time");
    }

    #[test]
    fn builder_reports_missing_fields() {
        let err = EventConsumer::builder().name("x").build().err();
        assert_eq!(err, Some(ConsumerBuildError::Missing("topics")));
    }

    #[tokio::test]
    async fn consumer_delivers_records_and_survives_handler_errors() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let consumer = EventConsumer::builder()
            .name("test")
            .topics(vec!["t".to_string()])
            .event_bus(bus.clone())
            .handler(Arc::new(Collecting {
                tx,
                fail_on: Some(b"poison".to_vec()),
            }))
            .shutdown(shutdown_rx)
            .retry_delay(Duration::from_millis(10))
            .build()
            .unwrap();
        let handle = consumer.spawn();
        wait_for_subscribers(&bus, 1).await;

        bus.publish(OutboundRecord::new("t", b"poison".to_vec())).await.unwrap();
        bus.publish(OutboundRecord::new("t", b"ok".to_vec())).await.unwrap();

        let record = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("record in time")
            .expect("channel open");
        assert_eq!(record.payload, b"ok");

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("consumer stops")
            .unwrap();
    }

    #[tokio::test]
    async fn spawn_group_runs_every_copy_until_shutdown() {
        struct Counting(Mutex<usize>);
        impl RecordHandler for Counting {
            fn handle<'a>(&'a self, _record: &'a BrokerRecord) -> HandlerFuture<'a> {
                Box::pin(async move {
                    *self.0.lock().unwrap() += 1;
                    Ok(())
                })
            }
        }

        let bus = Arc::new(InMemoryEventBus::new());
        let handler = Arc::new(Counting(Mutex::new(0)));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handles = EventConsumer::new("group", vec!["t".to_string()], bus.clone(), handler.clone(), shutdown_rx)
            .with_retry_delay(Duration::from_millis(10))
            .spawn_group(3);
        assert_eq!(handles.len(), 3);
        wait_for_subscribers(&bus, 3).await;

        bus.publish(OutboundRecord::new("t", Vec::new())).await.unwrap();
        // The in-memory bus has no groups, so every copy sees the record
        for _ in 0..200 {
            if *handler.0.lock().unwrap() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*handler.0.lock().unwrap(), 3);

        shutdown_tx.send(()).unwrap();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .expect("consumer stops")
                .unwrap();
        }
    }
}
