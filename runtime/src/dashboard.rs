//! Relays consumed records to dashboard subscribers.

use crate::broadcast::TopicBroadcaster;
use crate::consumer::{HandlerError, HandlerFuture, RecordHandler};
use crate::metrics::CatalogMetrics;
use catalog_core::environment::Clock;
use catalog_core::event::DashboardEvent;
use catalog_core::record::BrokerRecord;
use catalog_core::topics::DASHBOARD_EVENTS;
use std::sync::Arc;

/// [`RecordHandler`] that turns each record into a [`DashboardEvent`] and
/// publishes it on the `/topic/events` broadcaster topic.
///
/// Records whose payload is not JSON fail with [`HandlerError::Fatal`] so the
/// error handler dead-letters them without retrying.
#[derive(Clone)]
pub struct DashboardRelay {
    broadcaster: TopicBroadcaster<DashboardEvent>,
    clock: Arc<dyn Clock>,
}

impl DashboardRelay {
    /// Relay into `broadcaster`, stamping events with `clock`.
    #[must_use]
    pub fn new(broadcaster: TopicBroadcaster<DashboardEvent>, clock: Arc<dyn Clock>) -> Self {
        Self { broadcaster, clock }
    }

    /// The broadcaster dashboard sockets subscribe to.
    #[must_use]
    pub const fn broadcaster(&self) -> &TopicBroadcaster<DashboardEvent> {
        &self.broadcaster
    }
}

impl RecordHandler for DashboardRelay {
    fn handle<'a>(&'a self, record: &'a BrokerRecord) -> HandlerFuture<'a> {
        Box::pin(async move {
            let event = DashboardEvent::from_record(record, self.clock.now())
                .map_err(|e| HandlerError::Fatal(e.to_string()))?;

            tracing::info!(
                topic = %event.topic,
                partition = event.partition,
                offset = event.offset,
                key = ?event.key,
                event_type = %event.event_type,
                "Received record"
            );

            let receivers = self.broadcaster.publish(DASHBOARD_EVENTS, event).await;
            CatalogMetrics::record_dashboard_event();
            tracing::debug!(receivers, "Dashboard event broadcast");
            Ok(())
        })
    }
}

impl std::fmt::Debug for DashboardRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardRelay").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use catalog_core::event::ProductEventType;
    use catalog_testing::test_clock;

    fn record(payload: &[u8]) -> BrokerRecord {
        BrokerRecord {
            topic: "product-events".into(),
            partition: 0,
            offset: 3,
            key: Some("1".into()),
            payload: payload.to_vec(),
            headers: Vec::new(),
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn json_records_reach_dashboard_subscribers() {
        let relay = DashboardRelay::new(TopicBroadcaster::new(), Arc::new(test_clock()));
        let mut rx = relay.broadcaster().subscribe(DASHBOARD_EVENTS).await;

        relay
            .handle(&record(br#"{"eventType":"UPDATED","productId":1}"#))
            .await
            .unwrap();

        let (topic, event) = rx.recv().await.unwrap();
        assert_eq!(topic, DASHBOARD_EVENTS);
        assert_eq!(event.event_type, ProductEventType::Updated);
        assert_eq!(event.offset, 3);
        assert_eq!(event.timestamp, test_clock().now());
    }

    #[tokio::test]
    async fn non_json_records_are_fatal() {
        let relay = DashboardRelay::new(TopicBroadcaster::new(), Arc::new(test_clock()));
        let err = relay.handle(&record(b"plain text")).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
