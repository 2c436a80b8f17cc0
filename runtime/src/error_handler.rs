//! Retry-then-dead-letter wrapper for record handlers.
//!
//! [`DeadLetterErrorHandler`] runs an inner [`RecordHandler`]. Retryable
//! failures are retried with exponential backoff; once the policy is exhausted
//! (or straight away for fatal failures) the original record is copied to
//! `<topic>.DLT` with diagnostic headers:
//!
//! | header                   | value                         |
//! |--------------------------|-------------------------------|
//! | `dlt-exception-message`  | last handler error            |
//! | `dlt-original-topic`     | source topic                  |
//! | `dlt-original-partition` | source partition              |
//! | `dlt-original-offset`    | source offset                 |
//!
//! The record is considered consumed either way, so a poison record never
//! blocks its partition.

use crate::consumer::{HandlerError, HandlerFuture, RecordHandler};
use crate::metrics::CatalogMetrics;
use crate::retry::RetryPolicy;
use catalog_core::event_bus::EventBus;
use catalog_core::record::{BrokerRecord, OutboundRecord};
use catalog_core::topics;
use std::sync::Arc;

/// Header carrying the last handler error.
pub const HEADER_EXCEPTION_MESSAGE: &str = "dlt-exception-message";
/// Header carrying the source topic.
pub const HEADER_ORIGINAL_TOPIC: &str = "dlt-original-topic";
/// Header carrying the source partition.
pub const HEADER_ORIGINAL_PARTITION: &str = "dlt-original-partition";
/// Header carrying the source offset.
pub const HEADER_ORIGINAL_OFFSET: &str = "dlt-original-offset";

/// How a record ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The inner handler succeeded.
    Handled {
        /// Attempts made, including the successful one
        attempts: usize,
    },
    /// The record was forwarded to its dead-letter topic.
    DeadLettered {
        /// Attempts made before giving up
        attempts: usize,
    },
    /// Forwarding to the dead-letter topic failed too; the record is lost.
    Dropped,
}

/// Retries an inner handler and dead-letters records it cannot process.
pub struct DeadLetterErrorHandler {
    inner: Arc<dyn RecordHandler>,
    bus: Arc<dyn EventBus>,
    policy: RetryPolicy,
}

impl DeadLetterErrorHandler {
    /// Wrap `inner`, forwarding failures through `bus`.
    #[must_use]
    pub fn new(inner: Arc<dyn RecordHandler>, bus: Arc<dyn EventBus>, policy: RetryPolicy) -> Self {
        Self { inner, bus, policy }
    }

    /// The backoff policy in use.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the inner handler on `record` until it succeeds, fails fatally,
    /// or the retry policy is exhausted.
    pub async fn process(&self, record: &BrokerRecord) -> Outcome {
        let mut attempts = 0;

        loop {
            attempts += 1;
            let err = match self.inner.handle(record).await {
                Ok(()) => return Outcome::Handled { attempts },
                Err(err) => err,
            };

            let retry = attempts - 1;
            if !err.is_retryable() || retry >= self.policy.max_retries {
                tracing::error!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    attempts,
                    error = %err,
                    "Giving up on record"
                );
                return self.dead_letter(record, &err, attempts).await;
            }

            let delay = self.policy.delay_for_attempt(retry);
            tracing::warn!(
                topic = %record.topic,
                offset = record.offset,
                attempt = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Handler failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn dead_letter(&self, record: &BrokerRecord, err: &HandlerError, attempts: usize) -> Outcome {
        let dlt = topics::dead_letter(&record.topic);
        let forwarded = dead_letter_record(&dlt, record, err);

        match self.bus.publish(forwarded).await {
            Ok(delivery) => {
                CatalogMetrics::record_dead_lettered(&record.topic);
                tracing::warn!(
                    topic = %dlt,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    original_offset = record.offset,
                    "Record forwarded to dead-letter topic"
                );
                Outcome::DeadLettered { attempts }
            },
            Err(e) => {
                tracing::error!(
                    topic = %dlt,
                    original_topic = %record.topic,
                    original_offset = record.offset,
                    error = %e,
                    "Failed to forward record to dead-letter topic"
                );
                Outcome::Dropped
            },
        }
    }
}

/// Copy of `record` for `dlt` with the diagnostic headers appended.
fn dead_letter_record(dlt: &str, record: &BrokerRecord, err: &HandlerError) -> OutboundRecord {
    let mut forwarded = OutboundRecord::new(dlt, record.payload.clone());
    forwarded.key.clone_from(&record.key);
    forwarded.headers.clone_from(&record.headers);
    forwarded
        .with_header(HEADER_EXCEPTION_MESSAGE, err.to_string())
        .with_header(HEADER_ORIGINAL_TOPIC, record.topic.clone())
        .with_header(HEADER_ORIGINAL_PARTITION, record.partition.to_string())
        .with_header(HEADER_ORIGINAL_OFFSET, record.offset.to_string())
}

impl RecordHandler for DeadLetterErrorHandler {
    fn handle<'a>(&'a self, record: &'a BrokerRecord) -> HandlerFuture<'a> {
        Box::pin(async move {
            match self.process(record).await {
                Outcome::Handled { .. } | Outcome::DeadLettered { .. } => Ok(()),
                Outcome::Dropped => Err(HandlerError::Fatal(format!(
                    "record {}/{}@{} could not be dead-lettered",
                    record.topic, record.partition, record.offset
                ))),
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use catalog_testing::InMemoryEventBus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` calls with `error`.
    struct Flaky {
        calls: AtomicUsize,
        failures: usize,
        error: HandlerError,
    }

    impl Flaky {
        fn new(failures: usize, error: HandlerError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures,
                error,
            })
        }
    }

    impl RecordHandler for Flaky {
        fn handle<'a>(&'a self, _record: &'a BrokerRecord) -> HandlerFuture<'a> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n < self.failures { Err(self.error.clone()) } else { Ok(()) }
            })
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(3)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(4))
            .build()
    }

    fn record() -> BrokerRecord {
        BrokerRecord {
            topic: "product-events".into(),
            partition: 1,
            offset: 42,
            key: Some("7".into()),
            payload: br#"{"eventType":"CREATED","productId":7}"#.to_vec(),
            headers: vec![("trace".into(), "abc".into())],
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let bus = Arc::new(InMemoryEventBus::new());
        let inner = Flaky::new(2, HandlerError::Retryable("busy".into()));
        let handler = DeadLetterErrorHandler::new(inner.clone(), bus.clone(), fast_policy());

        assert_eq!(handler.process(&record()).await, Outcome::Handled { attempts: 3 });
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_forward_to_dead_letter_topic() {
        let bus = Arc::new(InMemoryEventBus::new());
        let inner = Flaky::new(usize::MAX, HandlerError::Retryable("db down".into()));
        let handler = DeadLetterErrorHandler::new(inner.clone(), bus.clone(), fast_policy());

        assert_eq!(handler.process(&record()).await, Outcome::DeadLettered { attempts: 4 });
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);

        let dlt = bus.published_to("product-events.DLT");
        assert_eq!(dlt.len(), 1);
        let forwarded = &dlt[0];
        assert_eq!(forwarded.key.as_deref(), Some("7"));
        assert_eq!(forwarded.payload, record().payload);

        let header = |name: &str| {
            forwarded
                .headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(header("trace").as_deref(), Some("abc"));
        assert_eq!(header(HEADER_ORIGINAL_TOPIC).as_deref(), Some("product-events"));
        assert_eq!(header(HEADER_ORIGINAL_PARTITION).as_deref(), Some("1"));
        assert_eq!(header(HEADER_ORIGINAL_OFFSET).as_deref(), Some("42"));
        assert!(header(HEADER_EXCEPTION_MESSAGE).unwrap().contains("db down"));
    }

    #[tokio::test]
    async fn fatal_failures_skip_retries() {
        let bus = Arc::new(InMemoryEventBus::new());
        let inner = Flaky::new(usize::MAX, HandlerError::Fatal("bad payload".into()));
        let handler = DeadLetterErrorHandler::new(inner.clone(), bus.clone(), fast_policy());

        assert_eq!(handler.process(&record()).await, Outcome::DeadLettered { attempts: 1 });
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dead_letter_publish_failure_drops_the_record() {
        let bus = Arc::new(InMemoryEventBus::new());
        bus.fail_next_publishes(1);
        let inner = Flaky::new(usize::MAX, HandlerError::Fatal("bad payload".into()));
        let handler = DeadLetterErrorHandler::new(inner, bus.clone(), fast_policy());

        assert_eq!(handler.process(&record()).await, Outcome::Dropped);
        assert!(handler.handle(&record()).await.is_ok());
    }
}
