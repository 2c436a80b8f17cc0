//! Start-up wiring: connects every resource and assembles the application.
//!
//! Order matters:
//! 1. Metrics recorder (so start-up counters are not lost)
//! 2. `PostgreSQL` pool, with retries, then migrations and seeding
//! 3. Broker client and topics (when enabled)
//! 4. Services, dashboard consumer and HTTP router

use crate::config::Config;
use crate::lifecycle::Application;
use catalog_core::environment::{Clock, SystemClock};
use catalog_core::error::CatalogError;
use catalog_core::event_bus::{EventBus, EventBusError};
use catalog_core::record::TopicSpec;
use catalog_core::repository::{CatalogRepository, RepositoryError, UserRepository};
use catalog_core::topics;
use catalog_postgres::{PostgresCatalogRepository, PostgresUserRepository};
use catalog_redpanda::RedpandaEventBus;
use catalog_runtime::consumer::ConsumerBuildError;
use catalog_runtime::metrics::{MetricsError, MetricsServer};
use catalog_runtime::retry::retry_with_backoff;
use catalog_runtime::{
    CategoryService, DashboardRelay, DeadLetterErrorHandler, EventConsumer, ProductEventPublisher,
    ProductService, RetryPolicy, TopicBroadcaster, seed,
};
use catalog_web::{AppState, RouterOptions, router};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Partitions of the product topic.
const PRODUCT_TOPIC_PARTITIONS: i32 = 3;

/// Partitions of the dead-letter topic.
const DLT_PARTITIONS: i32 = 1;

const REPLICATION: i32 = 1;

/// Start-up failures.
#[derive(Error, Debug)]
pub enum StartupError {
    /// Metrics recorder could not be installed
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// Database unreachable or migration failed
    #[error("Database: {0}")]
    Repository(#[from] RepositoryError),

    /// Seeding failed
    #[error("Seeding: {0}")]
    Seed(#[from] CatalogError),

    /// Broker client could not be created
    #[error("Event bus: {0}")]
    EventBus(#[from] EventBusError),

    /// Consumer misconfigured
    #[error(transparent)]
    Consumer(#[from] ConsumerBuildError),

    /// A listener could not be bound
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Requested address
        address: String,
        /// Underlying error
        source: std::io::Error,
    },
}

/// Policy for start-up connections: a few quick retries, capped at 5 s.
fn startup_policy() -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(5)
        .initial_delay(Duration::from_millis(500))
        .max_delay(Duration::from_secs(5))
        .build()
}

async fn bind(address: String) -> Result<TcpListener, StartupError> {
    TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })
}

/// Build the application described by `config`.
///
/// # Errors
///
/// Returns [`StartupError`] if any required resource cannot be reached.
/// An unreachable broker is not fatal when topics cannot be created; it is
/// fatal only if the client itself cannot be constructed.
pub async fn build(config: Config) -> Result<Application, StartupError> {
    let metrics_listener = bind(config.server.metrics_bind_address()).await?;
    let metrics_addr = metrics_listener
        .local_addr()
        .map_err(|source| StartupError::Bind {
            address: config.server.metrics_bind_address(),
            source,
        })?;
    let mut metrics = MetricsServer::new(metrics_addr);
    metrics.start()?;

    let pool = retry_with_backoff(&startup_policy(), "postgres_connect", || {
        catalog_postgres::connect(&config.database.url, config.database.max_connections)
    })
    .await?;
    catalog_postgres::migrate(&pool).await?;

    let catalog_repo: Arc<dyn CatalogRepository> = Arc::new(PostgresCatalogRepository::new(pool.clone()));
    let user_repo: Arc<dyn UserRepository> = Arc::new(PostgresUserRepository::new(pool));

    if config.seed_data {
        let catalog = seed::seed_catalog(catalog_repo.as_ref()).await?;
        let users = seed::seed_users(user_repo.as_ref()).await?;
        tracing::info!(
            categories = catalog.categories,
            products = catalog.products,
            roles_created = users.roles,
            users = users.users,
            "Seeding complete"
        );
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let bus = if config.kafka.enabled {
        Some(connect_bus(&config).await?)
    } else {
        tracing::warn!("Event streaming disabled; product changes will not be published");
        None
    };

    let publisher = match &bus {
        Some(bus) => ProductEventPublisher::new(Arc::clone(bus), config.kafka.product_topic.clone(), Arc::clone(&clock)),
        None => ProductEventPublisher::disabled(Arc::clone(&clock)),
    };

    let (shutdown_tx, _) = broadcast::channel(1);
    let dashboard = TopicBroadcaster::new();

    let consumer = match &bus {
        Some(bus) if config.dashboard_enabled => {
            let relay = DashboardRelay::new(dashboard.clone(), Arc::clone(&clock));
            let handler = DeadLetterErrorHandler::new(Arc::new(relay), Arc::clone(bus), config.dlt.retry_policy());
            Some(
                EventConsumer::builder()
                    .name("dashboard-consumer")
                    .topics(vec![config.kafka.product_topic.clone()])
                    .event_bus(Arc::clone(bus))
                    .handler(Arc::new(handler))
                    .shutdown(shutdown_tx.subscribe())
                    .build()?,
            )
        },
        _ => None,
    };

    let state = AppState::new(
        ProductService::new(Arc::clone(&catalog_repo), publisher),
        CategoryService::new(catalog_repo),
        user_repo,
        bus,
        dashboard,
    );
    let app = router(
        state,
        RouterOptions {
            dashboard: config.dashboard_enabled,
        },
    );

    let listener = bind(config.server.bind_address()).await?;

    Ok(Application::new(
        listener,
        app,
        metrics_listener,
        metrics,
        consumer,
        config.kafka.listener_concurrency,
        shutdown_tx,
    ))
}

async fn connect_bus(config: &Config) -> Result<Arc<dyn EventBus>, StartupError> {
    let bus = RedpandaEventBus::builder()
        .brokers(config.kafka.brokers.clone())
        .consumer_group(config.kafka.consumer_group.clone())
        .buffer_size(config.kafka.max_poll_records)
        .auto_offset_reset(config.kafka.auto_offset_reset.clone())
        .build()?;
    tracing::info!(brokers = %config.kafka.brokers, group = %config.kafka.consumer_group, "Event bus ready");

    let specs = [
        TopicSpec::new(config.kafka.product_topic.clone(), PRODUCT_TOPIC_PARTITIONS, REPLICATION),
        TopicSpec::new(topics::dead_letter(&config.kafka.product_topic), DLT_PARTITIONS, REPLICATION),
    ];
    match retry_with_backoff(&startup_policy(), "ensure_topics", || bus.ensure_topics(&specs)).await {
        Ok(()) => tracing::info!(topic = %config.kafka.product_topic, "Topics ready"),
        Err(e) => tracing::error!(error = %e, "Could not create topics; relying on broker auto-creation"),
    }

    Ok(Arc::new(bus))
}
