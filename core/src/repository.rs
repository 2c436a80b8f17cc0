//! Storage seams for catalog data and users.
//!
//! Both traits are dyn-compatible (`Pin<Box<dyn Future>>` returns) so services
//! can hold `Arc<dyn CatalogRepository>` and swap the Postgres implementation
//! for the in-memory one in tests.

use crate::model::{Category, CategoryPatch, NewCategory, NewProduct, Product, ProductPatch};
use crate::user::{NewUser, Role, User};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised by repositories.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Connection or query failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Row to update or read vanished.
    #[error("{entity} not found with id: {id}")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Requested id
        id: i64,
    },

    /// Unique constraint violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Foreign key constraint violated.
    #[error("Integrity violation: {0}")]
    Integrity(String),
}

/// Boxed future returned by repository methods.
pub type RepoFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Result of deleting a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Row removed
    Deleted,
    /// No such row
    NotFound,
    /// Products still reference the category
    InUse,
}

/// Persistence for categories and products.
///
/// Products are always returned with their category resolved.
pub trait CatalogRepository: Send + Sync {
    /// All categories ordered by id.
    fn list_categories(&self) -> RepoFuture<'_, Vec<Category>>;

    /// Category by id.
    fn find_category(&self, id: i64) -> RepoFuture<'_, Option<Category>>;

    /// Whether a category exists.
    fn category_exists(&self, id: i64) -> RepoFuture<'_, bool>;

    /// Insert a category and return it with its assigned id.
    fn insert_category(&self, input: NewCategory) -> RepoFuture<'_, Category>;

    /// Apply `patch` to category `id` and return the stored row.
    fn update_category(&self, id: i64, patch: CategoryPatch) -> RepoFuture<'_, Category>;

    /// Delete category `id`.
    fn delete_category(&self, id: i64) -> RepoFuture<'_, DeleteOutcome>;

    /// Number of categories.
    fn count_categories(&self) -> RepoFuture<'_, i64>;

    /// All products ordered by id.
    fn list_products(&self) -> RepoFuture<'_, Vec<Product>>;

    /// Product by id.
    fn find_product(&self, id: i64) -> RepoFuture<'_, Option<Product>>;

    /// Whether a product exists.
    fn product_exists(&self, id: i64) -> RepoFuture<'_, bool>;

    /// Products in category `category_id`, ordered by id.
    fn list_products_by_category(&self, category_id: i64) -> RepoFuture<'_, Vec<Product>>;

    /// Insert a product. The category must exist.
    fn insert_product(&self, input: NewProduct) -> RepoFuture<'_, Product>;

    /// Persist the current field values of `product` (including its category).
    fn update_product(&self, product: Product) -> RepoFuture<'_, Product>;

    /// Delete product `id`; returns whether a row was removed.
    fn delete_product(&self, id: i64) -> RepoFuture<'_, bool>;

    /// Number of products.
    fn count_products(&self) -> RepoFuture<'_, i64>;
}

/// Persistence for users and roles.
pub trait UserRepository: Send + Sync {
    /// User by username (case-sensitive).
    fn find_by_username(&self, username: &str) -> RepoFuture<'_, Option<User>>;

    /// Insert a user with its roles.
    fn insert_user(&self, user: NewUser) -> RepoFuture<'_, User>;

    /// Number of users.
    fn count_users(&self) -> RepoFuture<'_, i64>;

    /// Make sure each role has a row.
    fn ensure_roles(&self, roles: &[Role]) -> RepoFuture<'_, ()>;

    /// Number of role rows.
    fn count_roles(&self) -> RepoFuture<'_, i64>;
}
