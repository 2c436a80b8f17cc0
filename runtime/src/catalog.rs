//! Catalog services.
//!
//! [`ProductService`] and [`CategoryService`] sit between the GraphQL layer and
//! the repository. Product mutations are persisted first, then announced:
//!
//! 1. a [`ProductEvent`] is published to the broker (when publishing is enabled)
//! 2. the saved product is emitted on an in-process channel that feeds
//!    GraphQL subscriptions
//!
//! The repository is the source of truth, so a broker failure is logged and
//! counted but never fails the mutation.

use crate::broadcast::{TopicBroadcaster, TopicStream};
use crate::metrics::CatalogMetrics;
use catalog_core::environment::Clock;
use catalog_core::error::Result;
use catalog_core::event::{ProductEvent, ProductEventType};
use catalog_core::event_bus::EventBus;
use catalog_core::model::{Category, CategoryPatch, NewCategory, NewProduct, Product, ProductPatch};
use catalog_core::record::Delivery;
use catalog_core::repository::{CatalogRepository, DeleteOutcome};
use catalog_core::CatalogError;
use std::sync::Arc;
use std::time::Instant;

/// Channel emitted to after a product is created.
pub const PRODUCT_CREATED: &str = "productCreated";

/// Channel emitted to after a product is updated.
pub const PRODUCT_UPDATED: &str = "productUpdated";

/// What happened to a product event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The broker acknowledged the record.
    Published(Delivery),
    /// Publishing is disabled.
    Skipped,
    /// Encoding or the broker failed; the reason was logged.
    Failed(String),
}

/// Publishes [`ProductEvent`]s to the product topic.
#[derive(Clone)]
pub struct ProductEventPublisher {
    bus: Option<Arc<dyn EventBus>>,
    topic: String,
    clock: Arc<dyn Clock>,
}

impl ProductEventPublisher {
    /// Publisher writing to `topic` on `bus`.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, topic: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            bus: Some(bus),
            topic: topic.into(),
            clock,
        }
    }

    /// Publisher that skips every event.
    #[must_use]
    pub fn disabled(clock: Arc<dyn Clock>) -> Self {
        Self {
            bus: None,
            topic: catalog_core::topics::PRODUCT_EVENTS.to_string(),
            clock,
        }
    }

    /// Whether events reach a broker.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.bus.is_some()
    }

    /// Destination topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish a `event_type` event for `product_id`.
    pub async fn publish(&self, event_type: ProductEventType, product_id: i64) -> PublishOutcome {
        let Some(bus) = &self.bus else {
            tracing::info!(
                event_type = %event_type,
                product_id,
                "Kafka disabled: skipping product event"
            );
            return PublishOutcome::Skipped;
        };

        let event = ProductEvent::new(event_type, product_id, self.clock.now());
        let record = match event.to_record(&self.topic) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(product_id, error = %e, "Failed to encode product event");
                CatalogMetrics::record_publish_failed(&self.topic);
                return PublishOutcome::Failed(e.to_string());
            },
        };

        let started = Instant::now();
        match bus.publish(record).await {
            Ok(delivery) => {
                CatalogMetrics::record_published(&self.topic, started.elapsed());
                tracing::info!(
                    topic = %self.topic,
                    event_type = %event_type,
                    product_id,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "Product event sent"
                );
                PublishOutcome::Published(delivery)
            },
            Err(e) => {
                CatalogMetrics::record_publish_failed(&self.topic);
                tracing::warn!(
                    topic = %self.topic,
                    event_type = %event_type,
                    product_id,
                    error = %e,
                    "Unable to send product event"
                );
                PublishOutcome::Failed(e.to_string())
            },
        }
    }
}

impl std::fmt::Debug for ProductEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductEventPublisher")
            .field("enabled", &self.is_enabled())
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Product queries and mutations.
#[derive(Clone)]
pub struct ProductService {
    repo: Arc<dyn CatalogRepository>,
    publisher: ProductEventPublisher,
    broadcaster: TopicBroadcaster<Product>,
}

impl ProductService {
    /// Create a service over `repo` announcing through `publisher`.
    #[must_use]
    pub fn new(repo: Arc<dyn CatalogRepository>, publisher: ProductEventPublisher) -> Self {
        Self {
            repo,
            publisher,
            broadcaster: TopicBroadcaster::new(),
        }
    }

    /// The event publisher in use.
    #[must_use]
    pub const fn publisher(&self) -> &ProductEventPublisher {
        &self.publisher
    }

    /// All products.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Storage`] if the repository fails.
    pub async fn find_all_products(&self) -> Result<Vec<Product>> {
        Ok(self.repo.list_products().await?)
    }

    /// Product `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if there is no such product.
    pub async fn find_product(&self, id: i64) -> Result<Product> {
        self.repo
            .find_product(id)
            .await?
            .ok_or(CatalogError::product_not_found(id))
    }

    /// Products in category `category_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the category does not exist.
    pub async fn find_products_by_category(&self, category_id: i64) -> Result<Vec<Product>> {
        if !self.repo.category_exists(category_id).await? {
            return Err(CatalogError::category_not_found(category_id));
        }
        Ok(self.repo.list_products_by_category(category_id).await?)
    }

    /// Create a product, publish `CREATED` and notify subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] for bad input and
    /// [`CatalogError::NotFound`] if the category does not exist.
    pub async fn create_product(&self, input: NewProduct) -> Result<Product> {
        input.validate()?;
        if !self.repo.category_exists(input.category_id).await? {
            return Err(CatalogError::category_not_found(input.category_id));
        }

        let product = self.repo.insert_product(input).await?;
        CatalogMetrics::record_product_created();
        tracing::info!(product_id = product.id, name = %product.name, "Product created");

        self.publisher.publish(ProductEventType::Created, product.id).await;
        self.broadcaster.publish(PRODUCT_CREATED, product.clone()).await;
        Ok(product)
    }

    /// Apply `patch` to product `id`, publish `UPDATED` and notify subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the product, or a newly referenced
    /// category, does not exist.
    pub async fn update_product(&self, id: i64, patch: ProductPatch) -> Result<Product> {
        patch.validate()?;
        let mut product = self.find_product(id).await?;

        let category = match patch.category_id {
            Some(category_id) => Some(
                self.repo
                    .find_category(category_id)
                    .await?
                    .ok_or(CatalogError::category_not_found(category_id))?,
            ),
            None => None,
        };

        patch.apply(&mut product, category);
        let product = self.repo.update_product(product).await?;
        tracing::info!(product_id = product.id, "Product updated");

        self.publisher.publish(ProductEventType::Updated, product.id).await;
        self.broadcaster.publish(PRODUCT_UPDATED, product.clone()).await;
        Ok(product)
    }

    /// Delete product `id` and publish `DELETED`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if there is no such product.
    pub async fn delete_product(&self, id: i64) -> Result<bool> {
        if !self.repo.product_exists(id).await? {
            return Err(CatalogError::product_not_found(id));
        }
        if !self.repo.delete_product(id).await? {
            return Err(CatalogError::product_not_found(id));
        }
        tracing::info!(product_id = id, "Product deleted");

        self.publisher.publish(ProductEventType::Deleted, id).await;
        Ok(true)
    }

    /// Products created from now on.
    pub async fn subscribe_created(&self) -> TopicStream<Product> {
        self.broadcaster.stream(PRODUCT_CREATED).await
    }

    /// Products updated from now on.
    pub async fn subscribe_updated(&self) -> TopicStream<Product> {
        self.broadcaster.stream(PRODUCT_UPDATED).await
    }
}

impl std::fmt::Debug for ProductService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductService")
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

/// Category queries and mutations.
#[derive(Clone)]
pub struct CategoryService {
    repo: Arc<dyn CatalogRepository>,
}

impl CategoryService {
    /// Create a service over `repo`.
    #[must_use]
    pub fn new(repo: Arc<dyn CatalogRepository>) -> Self {
        Self { repo }
    }

    /// All categories.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Storage`] if the repository fails.
    pub async fn find_all_categories(&self) -> Result<Vec<Category>> {
        Ok(self.repo.list_categories().await?)
    }

    /// Category `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if there is no such category.
    pub async fn find_category(&self, id: i64) -> Result<Category> {
        self.repo
            .find_category(id)
            .await?
            .ok_or(CatalogError::category_not_found(id))
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] for a blank name and
    /// [`CatalogError::Conflict`] if the name is taken.
    pub async fn create_category(&self, input: NewCategory) -> Result<Category> {
        input.validate()?;
        let category = self.repo.insert_category(input).await?;
        tracing::info!(category_id = category.id, name = %category.name, "Category created");
        Ok(category)
    }

    /// Apply the present fields of `patch` to category `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if there is no such category.
    pub async fn update_category(&self, id: i64, patch: CategoryPatch) -> Result<Category> {
        patch.validate()?;
        if !self.repo.category_exists(id).await? {
            return Err(CatalogError::category_not_found(id));
        }
        let category = self.repo.update_category(id, patch).await?;
        tracing::info!(category_id = id, "Category updated");
        Ok(category)
    }

    /// Delete category `id`.
    ///
    /// Returns `false` when products still reference the category.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if there is no such category.
    pub async fn delete_category(&self, id: i64) -> Result<bool> {
        match self.repo.delete_category(id).await? {
            DeleteOutcome::Deleted => {
                tracing::info!(category_id = id, "Category deleted");
                Ok(true)
            },
            DeleteOutcome::NotFound => Err(CatalogError::category_not_found(id)),
            DeleteOutcome::InUse => {
                tracing::error!(category_id = id, "Cannot delete category: products still reference it");
                Ok(false)
            },
        }
    }
}

impl std::fmt::Debug for CategoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryService").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use catalog_core::topics::PRODUCT_EVENTS;
    use catalog_testing::{InMemoryCatalogRepository, InMemoryEventBus, fixtures, test_clock};
    use futures::StreamExt;
    use rust_decimal::Decimal;

    struct Harness {
        repo: Arc<InMemoryCatalogRepository>,
        bus: Arc<InMemoryEventBus>,
        products: ProductService,
        categories: CategoryService,
    }

    fn harness() -> Harness {
        let repo = Arc::new(InMemoryCatalogRepository::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let publisher = ProductEventPublisher::new(bus.clone(), PRODUCT_EVENTS, Arc::new(test_clock()));
        Harness {
            products: ProductService::new(repo.clone(), publisher),
            categories: CategoryService::new(repo.clone()),
            repo,
            bus,
        }
    }

    fn decode(record: &catalog_core::record::OutboundRecord) -> ProductEvent {
        serde_json::from_slice(&record.payload).unwrap()
    }

    #[tokio::test]
    async fn create_product_persists_and_publishes_created() {
        let h = harness();
        let books = h.categories.create_category(fixtures::new_category("Books")).await.unwrap();

        let product = h
            .products
            .create_product(fixtures::new_product("Effective Java", books.id))
            .await
            .unwrap();

        assert_eq!(product.category.id, books.id);
        let published = h.bus.published_to(PRODUCT_EVENTS);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].key, Some(product.id.to_string()));

        let event = decode(&published[0]);
        assert_eq!(event.event_type, ProductEventType::Created);
        assert_eq!(event.product_id, product.id);
        assert_eq!(event.timestamp, test_clock().now());
    }

    #[tokio::test]
    async fn create_product_with_unknown_category_fails_without_publishing() {
        let h = harness();
        let err = h
            .products
            .create_product(fixtures::new_product("Orphan", 42))
            .await
            .unwrap_err();

        assert_eq!(err, CatalogError::category_not_found(42));
        assert!(h.bus.published().is_empty());
    }

    #[tokio::test]
    async fn invalid_product_is_rejected() {
        let h = harness();
        let books = h.categories.create_category(fixtures::new_category("Books")).await.unwrap();
        let mut input = fixtures::new_product("Broken", books.id);
        input.price = Decimal::new(-1, 0);

        let err = h.products.create_product(input).await.unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[tokio::test]
    async fn update_product_applies_present_fields_only() {
        let h = harness();
        let books = h.categories.create_category(fixtures::new_category("Books")).await.unwrap();
        let music = h.categories.create_category(fixtures::new_category("Music")).await.unwrap();
        let product = h
            .products
            .create_product(fixtures::new_product("Vinyl", books.id))
            .await
            .unwrap();

        let patch = ProductPatch {
            stock_quantity: Some(3),
            category_id: Some(music.id),
            ..ProductPatch::default()
        };
        let updated = h.products.update_product(product.id, patch).await.unwrap();

        assert_eq!(updated.name, "Vinyl");
        assert_eq!(updated.price, product.price);
        assert_eq!(updated.stock_quantity, 3);
        assert_eq!(updated.category.name, "Music");

        let published = h.bus.published_to(PRODUCT_EVENTS);
        assert_eq!(decode(&published[1]).event_type, ProductEventType::Updated);
    }

    #[tokio::test]
    async fn update_missing_product_or_category_is_not_found() {
        let h = harness();
        let err = h
            .products
            .update_product(7, fixtures::restock(1))
            .await
            .unwrap_err();
        assert_eq!(err, CatalogError::product_not_found(7));

        let books = h.categories.create_category(fixtures::new_category("Books")).await.unwrap();
        let product = h
            .products
            .create_product(fixtures::new_product("Atlas", books.id))
            .await
            .unwrap();
        let patch = ProductPatch {
            category_id: Some(99),
            ..ProductPatch::default()
        };
        let err = h.products.update_product(product.id, patch).await.unwrap_err();
        assert_eq!(err, CatalogError::category_not_found(99));
    }

    #[tokio::test]
    async fn delete_product_publishes_deleted() {
        let h = harness();
        let books = h.categories.create_category(fixtures::new_category("Books")).await.unwrap();
        let product = h
            .products
            .create_product(fixtures::new_product("Atlas", books.id))
            .await
            .unwrap();

        assert!(h.products.delete_product(product.id).await.unwrap());
        assert_eq!(
            h.products.delete_product(product.id).await.unwrap_err(),
            CatalogError::product_not_found(product.id)
        );

        let published = h.bus.published_to(PRODUCT_EVENTS);
        assert_eq!(published.len(), 2);
        assert_eq!(decode(&published[1]).event_type, ProductEventType::Deleted);
    }

    #[tokio::test]
    async fn broker_failure_does_not_fail_the_mutation() {
        let h = harness();
        let books = h.categories.create_category(fixtures::new_category("Books")).await.unwrap();
        h.bus.fail_next_publishes(1);

        let product = h
            .products
            .create_product(fixtures::new_product("Atlas", books.id))
            .await
            .unwrap();

        assert!(h.products.find_product(product.id).await.is_ok());
        assert!(h.bus.published().is_empty());
    }

    #[tokio::test]
    async fn disabled_publisher_skips_events() {
        let repo = Arc::new(InMemoryCatalogRepository::new());
        let publisher = ProductEventPublisher::disabled(Arc::new(test_clock()));
        assert!(!publisher.is_enabled());
        assert_eq!(publisher.publish(ProductEventType::Created, 1).await, PublishOutcome::Skipped);

        let products = ProductService::new(repo.clone(), publisher);
        let books = CategoryService::new(repo)
            .create_category(fixtures::new_category("Books"))
            .await
            .unwrap();
        assert!(products.create_product(fixtures::new_product("Atlas", books.id)).await.is_ok());
    }

    #[tokio::test]
    async fn subscribers_see_created_and_updated_products() {
        let h = harness();
        let books = h.categories.create_category(fixtures::new_category("Books")).await.unwrap();
        let mut created = h.products.subscribe_created().await;
        let mut updated = h.products.subscribe_updated().await;

        let product = h
            .products
            .create_product(fixtures::new_product("Atlas", books.id))
            .await
            .unwrap();
        h.products
            .update_product(product.id, fixtures::restock(0))
            .await
            .unwrap();

        assert_eq!(created.next().await.unwrap().id, product.id);
        assert_eq!(updated.next().await.unwrap().stock_quantity, 0);
    }

    #[tokio::test]
    async fn products_by_category_requires_the_category() {
        let h = harness();
        assert_eq!(
            h.products.find_products_by_category(5).await.unwrap_err(),
            CatalogError::category_not_found(5)
        );

        let books = h.categories.create_category(fixtures::new_category("Books")).await.unwrap();
        h.products
            .create_product(fixtures::new_product("Atlas", books.id))
            .await
            .unwrap();
        assert_eq!(h.products.find_products_by_category(books.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn category_delete_outcomes() {
        let h = harness();
        let books = h.categories.create_category(fixtures::new_category("Books")).await.unwrap();
        let empty = h.categories.create_category(fixtures::new_category("Empty")).await.unwrap();
        h.products
            .create_product(fixtures::new_product("Atlas", books.id))
            .await
            .unwrap();

        assert!(!h.categories.delete_category(books.id).await.unwrap());
        assert!(h.categories.delete_category(empty.id).await.unwrap());
        assert_eq!(
            h.categories.delete_category(empty.id).await.unwrap_err(),
            CatalogError::category_not_found(empty.id)
        );
    }

    #[tokio::test]
    async fn category_update_keeps_absent_fields() {
        let h = harness();
        let category = h
            .categories
            .create_category(NewCategory::new("Books", Some("Paper")))
            .await
            .unwrap();

        let patch = CategoryPatch {
            name: Some("Literature".into()),
            description: None,
        };
        let updated = h.categories.update_category(category.id, patch).await.unwrap();
        assert_eq!(updated.name, "Literature");
        assert_eq!(updated.description.as_deref(), Some("Paper"));

        assert_eq!(
            h.categories
                .update_category(99, CategoryPatch::default())
                .await
                .unwrap_err(),
            CatalogError::category_not_found(99)
        );
    }

    #[tokio::test]
    async fn storage_failures_surface_as_storage_errors() {
        let h = harness();
        h.repo.set_unavailable(true);
        let err = h.products.find_all_products().await.unwrap_err();
        assert!(matches!(err, CatalogError::Storage(_)));
    }
}
