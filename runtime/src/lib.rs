//! # Catalog Runtime
//!
//! Services and background machinery for the product catalog.
//!
//! ## Core Components
//!
//! - **Services**: [`catalog::ProductService`] and [`catalog::CategoryService`]
//! - **Broadcaster**: [`broadcast::TopicBroadcaster`], in-process multicast
//!   feeding GraphQL subscriptions and the dashboard socket
//! - **Consumer**: [`consumer::EventConsumer`], a subscribe-process-reconnect loop
//! - **Error handling**: [`error_handler::DeadLetterErrorHandler`], backoff then
//!   dead-letter topic
//! - **Dashboard**: [`dashboard::DashboardRelay`], consumed records to subscribers
//! - **Seeding**: [`seed`], sample catalog and default users
//!
//! ## Event flow
//!
//! ```text
//! ProductService ──publish──► product-events ──► EventConsumer
//!       │                                            │
//!       ▼                                            ▼
//! productCreated / productUpdated        DeadLetterErrorHandler(DashboardRelay)
//!                                                    │
//!                                                    ▼
//!                                             /topic/events
//! ```

/// Named multicast channels
pub mod broadcast;

/// Product and category services
pub mod catalog;

/// Broker consumer loop
pub mod consumer;

/// Dashboard relay
pub mod dashboard;

/// Retry-then-dead-letter handler wrapper
pub mod error_handler;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

/// Sample data
pub mod seed;

pub use broadcast::TopicBroadcaster;
pub use catalog::{CategoryService, ProductEventPublisher, ProductService, PublishOutcome};
pub use consumer::{EventConsumer, HandlerError, RecordHandler};
pub use dashboard::DashboardRelay;
pub use error_handler::{DeadLetterErrorHandler, Outcome};
pub use retry::RetryPolicy;
