//! In-memory repositories.
//!
//! Behave like the `PostgreSQL` ones: unique category names, foreign keys
//! from products to categories, ids assigned in insertion order.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap on poisoned locks
#![allow(clippy::missing_panics_doc)]

use catalog_core::model::{Category, CategoryPatch, NewCategory, NewProduct, Product};
use catalog_core::repository::{
    CatalogRepository, DeleteOutcome, RepoFuture, RepositoryError, UserRepository,
};
use catalog_core::user::{NewUser, Role, User};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct StoredProduct {
    id: i64,
    name: String,
    description: Option<String>,
    price: Decimal,
    stock_quantity: i32,
    category_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CatalogState {
    categories: BTreeMap<i64, Category>,
    products: BTreeMap<i64, StoredProduct>,
    next_category_id: i64,
    next_product_id: i64,
}

impl CatalogState {
    fn resolve(&self, stored: &StoredProduct) -> Result<Product, RepositoryError> {
        let category = self
            .categories
            .get(&stored.category_id)
            .cloned()
            .ok_or(RepositoryError::Integrity(format!(
                "product {} references missing category {}",
                stored.id, stored.category_id
            )))?;
        Ok(Product {
            id: stored.id,
            name: stored.name.clone(),
            description: stored.description.clone(),
            price: stored.price,
            stock_quantity: stored.stock_quantity,
            category,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        })
    }

    fn name_taken(&self, name: &str, except: Option<i64>) -> bool {
        self.categories
            .values()
            .any(|c| c.name == name && Some(c.id) != except)
    }
}

/// In-memory [`CatalogRepository`].
///
/// Clones share state. [`Self::set_unavailable`] makes every call fail with
/// [`RepositoryError::Database`], for exercising error paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogRepository {
    state: Arc<Mutex<CatalogState>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCatalogRepository {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a lost database connection.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database("connection refused".to_string()));
        }
        Ok(())
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut CatalogState) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }
}

impl CatalogRepository for InMemoryCatalogRepository {
    fn list_categories(&self) -> RepoFuture<'_, Vec<Category>> {
        let result = self.with_state(|s| Ok(s.categories.values().cloned().collect()));
        Box::pin(async move { result })
    }

    fn find_category(&self, id: i64) -> RepoFuture<'_, Option<Category>> {
        let result = self.with_state(|s| Ok(s.categories.get(&id).cloned()));
        Box::pin(async move { result })
    }

    fn category_exists(&self, id: i64) -> RepoFuture<'_, bool> {
        let result = self.with_state(|s| Ok(s.categories.contains_key(&id)));
        Box::pin(async move { result })
    }

    fn insert_category(&self, input: NewCategory) -> RepoFuture<'_, Category> {
        let result = self.with_state(|s| {
            if s.name_taken(&input.name, None) {
                return Err(RepositoryError::Conflict(format!(
                    "category name '{}' already exists",
                    input.name
                )));
            }
            s.next_category_id += 1;
            let now = Utc::now();
            let category = Category {
                id: s.next_category_id,
                name: input.name,
                description: input.description,
                created_at: now,
                updated_at: now,
            };
            s.categories.insert(category.id, category.clone());
            Ok(category)
        });
        Box::pin(async move { result })
    }

    fn update_category(&self, id: i64, patch: CategoryPatch) -> RepoFuture<'_, Category> {
        let result = self.with_state(|s| {
            if let Some(name) = &patch.name {
                if s.name_taken(name, Some(id)) {
                    return Err(RepositoryError::Conflict(format!(
                        "category name '{name}' already exists"
                    )));
                }
            }
            let category = s.categories.get_mut(&id).ok_or(RepositoryError::NotFound {
                entity: "Category",
                id,
            })?;
            patch.apply(category);
            category.updated_at = Utc::now();
            Ok(category.clone())
        });
        Box::pin(async move { result })
    }

    fn delete_category(&self, id: i64) -> RepoFuture<'_, DeleteOutcome> {
        let result = self.with_state(|s| {
            if !s.categories.contains_key(&id) {
                return Ok(DeleteOutcome::NotFound);
            }
            if s.products.values().any(|p| p.category_id == id) {
                return Ok(DeleteOutcome::InUse);
            }
            s.categories.remove(&id);
            Ok(DeleteOutcome::Deleted)
        });
        Box::pin(async move { result })
    }

    fn count_categories(&self) -> RepoFuture<'_, i64> {
        let result = self.with_state(|s| Ok(i64::try_from(s.categories.len()).unwrap_or(i64::MAX)));
        Box::pin(async move { result })
    }

    fn list_products(&self) -> RepoFuture<'_, Vec<Product>> {
        let result = self.with_state(|s| s.products.values().map(|p| s.resolve(p)).collect());
        Box::pin(async move { result })
    }

    fn find_product(&self, id: i64) -> RepoFuture<'_, Option<Product>> {
        let result = self.with_state(|s| s.products.get(&id).map(|p| s.resolve(p)).transpose());
        Box::pin(async move { result })
    }

    fn product_exists(&self, id: i64) -> RepoFuture<'_, bool> {
        let result = self.with_state(|s| Ok(s.products.contains_key(&id)));
        Box::pin(async move { result })
    }

    fn list_products_by_category(&self, category_id: i64) -> RepoFuture<'_, Vec<Product>> {
        let result = self.with_state(|s| {
            s.products
                .values()
                .filter(|p| p.category_id == category_id)
                .map(|p| s.resolve(p))
                .collect()
        });
        Box::pin(async move { result })
    }

    fn insert_product(&self, input: NewProduct) -> RepoFuture<'_, Product> {
        let result = self.with_state(|s| {
            if !s.categories.contains_key(&input.category_id) {
                return Err(RepositoryError::NotFound {
                    entity: "Category",
                    id: input.category_id,
                });
            }
            s.next_product_id += 1;
            let now = Utc::now();
            let stored = StoredProduct {
                id: s.next_product_id,
                name: input.name,
                description: input.description,
                price: input.price,
                stock_quantity: input.stock_quantity,
                category_id: input.category_id,
                created_at: now,
                updated_at: now,
            };
            s.products.insert(stored.id, stored.clone());
            s.resolve(&stored)
        });
        Box::pin(async move { result })
    }

    fn update_product(&self, product: Product) -> RepoFuture<'_, Product> {
        let result = self.with_state(|s| {
            if !s.categories.contains_key(&product.category.id) {
                return Err(RepositoryError::NotFound {
                    entity: "Category",
                    id: product.category.id,
                });
            }
            let stored = s.products.get_mut(&product.id).ok_or(RepositoryError::NotFound {
                entity: "Product",
                id: product.id,
            })?;
            stored.name = product.name;
            stored.description = product.description;
            stored.price = product.price;
            stored.stock_quantity = product.stock_quantity;
            stored.category_id = product.category.id;
            stored.updated_at = Utc::now();
            let stored = stored.clone();
            s.resolve(&stored)
        });
        Box::pin(async move { result })
    }

    fn delete_product(&self, id: i64) -> RepoFuture<'_, bool> {
        let result = self.with_state(|s| Ok(s.products.remove(&id).is_some()));
        Box::pin(async move { result })
    }

    fn count_products(&self) -> RepoFuture<'_, i64> {
        let result = self.with_state(|s| Ok(i64::try_from(s.products.len()).unwrap_or(i64::MAX)));
        Box::pin(async move { result })
    }
}

#[derive(Debug, Default)]
struct UserState {
    users: BTreeMap<i64, User>,
    roles: BTreeSet<Role>,
    next_id: i64,
}

/// In-memory [`UserRepository`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserRepository {
    state: Arc<Mutex<UserState>>,
}

impl InMemoryUserRepository {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserRepository for InMemoryUserRepository {
    fn find_by_username(&self, username: &str) -> RepoFuture<'_, Option<User>> {
        let state = self.state.lock().unwrap();
        let user = state.users.values().find(|u| u.username == username).cloned();
        Box::pin(async move { Ok(user) })
    }

    fn insert_user(&self, user: NewUser) -> RepoFuture<'_, User> {
        let mut state = self.state.lock().unwrap();
        let result = if state
            .users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            Err(RepositoryError::Conflict(format!(
                "user '{}' already exists",
                user.username
            )))
        } else {
            state.next_id += 1;
            state.roles.extend(user.roles.iter().copied());
            let stored = User {
                id: state.next_id,
                username: user.username,
                email: user.email,
                password_hash: user.password_hash,
                first_name: user.first_name,
                last_name: user.last_name,
                roles: user.roles,
                enabled: user.enabled,
            };
            state.users.insert(stored.id, stored.clone());
            Ok(stored)
        };
        Box::pin(async move { result })
    }

    fn count_users(&self) -> RepoFuture<'_, i64> {
        let count = self.state.lock().unwrap().users.len();
        Box::pin(async move { Ok(i64::try_from(count).unwrap_or(i64::MAX)) })
    }

    fn ensure_roles(&self, roles: &[Role]) -> RepoFuture<'_, ()> {
        self.state.lock().unwrap().roles.extend(roles.iter().copied());
        Box::pin(async move { Ok(()) })
    }

    fn count_roles(&self) -> RepoFuture<'_, i64> {
        let count = self.state.lock().unwrap().roles.len();
        Box::pin(async move { Ok(i64::try_from(count).unwrap_or(i64::MAX)) })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn category_names_are_unique() {
        let repo = InMemoryCatalogRepository::new();
        repo.insert_category(fixtures::new_category("Books"))
            .await
            .expect("first insert");
        let err = repo
            .insert_category(fixtures::new_category("Books"))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn products_see_category_renames() {
        let repo = InMemoryCatalogRepository::new();
        let category = repo
            .insert_category(fixtures::new_category("Books"))
            .await
            .expect("insert");
        let product = repo
            .insert_product(fixtures::new_product("Novel", category.id))
            .await
            .expect("insert");

        repo.update_category(
            category.id,
            CategoryPatch {
                name: Some("Literature".into()),
                description: None,
            },
        )
        .await
        .expect("rename");

        let reloaded = repo
            .find_product(product.id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(reloaded.category.name, "Literature");
    }

    #[tokio::test]
    async fn referenced_category_cannot_be_deleted() {
        let repo = InMemoryCatalogRepository::new();
        let category = repo
            .insert_category(fixtures::new_category("Books"))
            .await
            .expect("insert");
        let product = repo
            .insert_product(fixtures::new_product("Novel", category.id))
            .await
            .expect("insert");

        assert_eq!(
            repo.delete_category(category.id).await.expect("delete"),
            DeleteOutcome::InUse
        );
        assert!(repo.delete_product(product.id).await.expect("delete"));
        assert_eq!(
            repo.delete_category(category.id).await.expect("delete"),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            repo.delete_category(category.id).await.expect("delete"),
            DeleteOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn unavailable_repository_fails_every_call() {
        let repo = InMemoryCatalogRepository::new();
        repo.set_unavailable(true);
        assert!(matches!(
            repo.list_products().await,
            Err(RepositoryError::Database(_))
        ));
        repo.set_unavailable(false);
        assert!(repo.list_products().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn users_are_found_by_username() {
        let repo = InMemoryUserRepository::new();
        repo.insert_user(fixtures::admin_user()).await.expect("insert");

        let admin = repo
            .find_by_username("admin")
            .await
            .expect("find")
            .expect("exists");
        assert!(admin.has_role(Role::Admin));
        assert_eq!(repo.count_roles().await.expect("count"), 3);
        assert!(repo.find_by_username("Admin").await.expect("find").is_none());
    }
}
