//! Application state shared by all handlers.

use crate::graphql::{CatalogSchema, build_schema};
use catalog_core::event::DashboardEvent;
use catalog_core::event_bus::EventBus;
use catalog_core::repository::UserRepository;
use catalog_runtime::{CategoryService, ProductService, TopicBroadcaster};
use std::sync::Arc;

/// Everything a request handler can reach.
///
/// Cloning is cheap: services and repositories are reference-counted.
#[derive(Clone)]
pub struct AppState {
    /// Product queries and mutations
    pub products: ProductService,
    /// Category queries and mutations
    pub categories: CategoryService,
    /// Credentials store
    pub users: Arc<dyn UserRepository>,
    /// Broker, when event streaming is enabled
    pub bus: Option<Arc<dyn EventBus>>,
    /// Channel the dashboard socket listens on
    pub dashboard: TopicBroadcaster<DashboardEvent>,
    /// Executable GraphQL schema
    pub schema: CatalogSchema,
}

impl AppState {
    /// Assemble state and build the GraphQL schema over `products` and
    /// `categories`.
    #[must_use]
    pub fn new(
        products: ProductService,
        categories: CategoryService,
        users: Arc<dyn UserRepository>,
        bus: Option<Arc<dyn EventBus>>,
        dashboard: TopicBroadcaster<DashboardEvent>,
    ) -> Self {
        let schema = build_schema(products.clone(), categories.clone());
        Self {
            products,
            categories,
            users,
            bus,
            dashboard,
            schema,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("products", &self.products)
            .field("bus_enabled", &self.bus.is_some())
            .finish_non_exhaustive()
    }
}
