//! End-to-end event flow over the in-memory doubles:
//! mutation → product-events → consumer → dashboard subscribers.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

use catalog_core::event::{DashboardEvent, ProductEventType};
use catalog_core::event_bus::EventBus;
use catalog_core::record::OutboundRecord;
use catalog_core::topics::{DASHBOARD_EVENTS, PRODUCT_EVENTS};
use catalog_runtime::{
    CategoryService, DashboardRelay, DeadLetterErrorHandler, EventConsumer, ProductEventPublisher,
    ProductService, RetryPolicy, TopicBroadcaster,
};
use catalog_testing::{InMemoryCatalogRepository, InMemoryEventBus, fixtures, test_clock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Running {
    bus: Arc<InMemoryEventBus>,
    products: ProductService,
    categories: CategoryService,
    dashboard: TopicBroadcaster<DashboardEvent>,
    shutdown: broadcast::Sender<()>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

async fn start() -> Running {
    catalog_testing::init_tracing();

    let repo = Arc::new(InMemoryCatalogRepository::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let clock = Arc::new(test_clock());

    let publisher = ProductEventPublisher::new(bus.clone(), PRODUCT_EVENTS, clock.clone());
    let dashboard = TopicBroadcaster::new();
    let relay = Arc::new(DashboardRelay::new(dashboard.clone(), clock));
    let policy = RetryPolicy::builder()
        .max_retries(2)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(2))
        .build();
    let handler = Arc::new(DeadLetterErrorHandler::new(relay, bus.clone(), policy));

    let (shutdown, shutdown_rx) = broadcast::channel(1);
    let handles = EventConsumer::builder()
        .name("dashboard")
        .topics(vec![PRODUCT_EVENTS.to_string()])
        .event_bus(bus.clone())
        .handler(handler)
        .shutdown(shutdown_rx)
        .retry_delay(Duration::from_millis(10))
        .build()
        .unwrap()
        .spawn();

    for _ in 0..200 {
        if bus.subscriber_count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(bus.subscriber_count() > 0, "consumer never subscribed");

    Running {
        products: ProductService::new(repo.clone(), publisher),
        categories: CategoryService::new(repo),
        bus,
        dashboard,
        shutdown,
        handles: vec![handles],
    }
}

async fn stop(running: Running) {
    running.shutdown.send(()).unwrap();
    for handle in running.handles {
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("consumer stops")
            .unwrap();
    }
}

#[tokio::test]
async fn created_product_reaches_the_dashboard() {
    let running = start().await;
    let mut dashboard = running.dashboard.subscribe(DASHBOARD_EVENTS).await;

    let books = running
        .categories
        .create_category(fixtures::new_category("Books"))
        .await
        .unwrap();
    let product = running
        .products
        .create_product(fixtures::new_product("Effective Java", books.id))
        .await
        .unwrap();

    let (_, event) = tokio::time::timeout(Duration::from_secs(2), dashboard.recv())
        .await
        .expect("dashboard event in time")
        .unwrap();
    assert_eq!(event.topic, PRODUCT_EVENTS);
    assert_eq!(event.event_type, ProductEventType::Created);
    assert_eq!(event.key, Some(product.id.to_string()));
    assert!(event.is_product_event());

    stop(running).await;
}

#[tokio::test]
async fn poison_record_is_dead_lettered_and_consumption_continues() {
    let running = start().await;
    let mut dashboard = running.dashboard.subscribe(DASHBOARD_EVENTS).await;

    running
        .bus
        .publish(OutboundRecord::new(PRODUCT_EVENTS, b"not json".to_vec()))
        .await
        .unwrap();
    running
        .bus
        .publish(OutboundRecord::new(PRODUCT_EVENTS, br#"{"eventType":"DELETED"}"#.to_vec()))
        .await
        .unwrap();

    let (_, event) = tokio::time::timeout(Duration::from_secs(2), dashboard.recv())
        .await
        .expect("dashboard event in time")
        .unwrap();
    assert_eq!(event.event_type, ProductEventType::Deleted);

    let dlt = running.bus.published_to("product-events.DLT");
    assert_eq!(dlt.len(), 1);
    assert_eq!(dlt[0].payload, b"not json");

    stop(running).await;
}
