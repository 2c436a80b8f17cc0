//! Category and product storage.

use crate::map_db_error;
use catalog_core::model::{Category, CategoryPatch, NewCategory, NewProduct, Product};
use catalog_core::repository::{CatalogRepository, DeleteOutcome, RepoFuture, RepositoryError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

/// Product columns joined with their category, aliased to match [`ProductRow`].
const PRODUCT_SELECT: &str = r"
    SELECT p.id, p.name, p.description, p.price, p.stock_quantity,
           p.created_at, p.updated_at,
           c.id AS category_id, c.name AS category_name,
           c.description AS category_description,
           c.created_at AS category_created_at, c.updated_at AS category_updated_at
";

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    description: Option<String>,
    price: Decimal,
    stock_quantity: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    category_id: i64,
    category_name: String,
    category_description: Option<String>,
    category_created_at: DateTime<Utc>,
    category_updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            price: row.price,
            stock_quantity: row.stock_quantity,
            category: Category {
                id: row.category_id,
                name: row.category_name,
                description: row.category_description,
                created_at: row.category_created_at,
                updated_at: row.category_updated_at,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// `PostgreSQL` catalog repository.
///
/// Products are always read joined with their category. Writes that return a
/// product use a data-modifying CTE so the join happens in the same statement.
#[derive(Clone)]
pub struct PostgresCatalogRepository {
    pool: PgPool,
}

impl PostgresCatalogRepository {
    /// Create a repository over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// A missing category on product insert/update surfaces as a foreign key violation.
fn category_violation(category_id: i64, err: RepositoryError) -> RepositoryError {
    match err {
        RepositoryError::Integrity(_) => RepositoryError::NotFound {
            entity: "Category",
            id: category_id,
        },
        other => other,
    }
}

impl CatalogRepository for PostgresCatalogRepository {
    fn list_categories(&self) -> RepoFuture<'_, Vec<Category>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, CategoryRow>(
                "SELECT id, name, description, created_at, updated_at FROM categories ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to list categories", e))?;

            Ok(rows.into_iter().map(Category::from).collect())
        })
    }

    fn find_category(&self, id: i64) -> RepoFuture<'_, Option<Category>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, CategoryRow>(
                "SELECT id, name, description, created_at, updated_at FROM categories WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to load category", e))?;

            Ok(row.map(Category::from))
        })
    }

    fn category_exists(&self, id: i64) -> RepoFuture<'_, bool> {
        Box::pin(async move {
            let (exists,): (bool,) =
                sqlx::query_as("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| map_db_error("Failed to check category", e))?;
            Ok(exists)
        })
    }

    fn insert_category(&self, input: NewCategory) -> RepoFuture<'_, Category> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, CategoryRow>(
                r"
                INSERT INTO categories (name, description)
                VALUES ($1, $2)
                RETURNING id, name, description, created_at, updated_at
                ",
            )
            .bind(&input.name)
            .bind(&input.description)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to insert category", e))?;

            tracing::debug!(category_id = row.id, name = %row.name, "Category inserted");
            Ok(row.into())
        })
    }

    fn update_category(&self, id: i64, patch: CategoryPatch) -> RepoFuture<'_, Category> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, CategoryRow>(
                r"
                UPDATE categories
                SET name = COALESCE($2, name),
                    description = COALESCE($3, description),
                    updated_at = now()
                WHERE id = $1
                RETURNING id, name, description, created_at, updated_at
                ",
            )
            .bind(id)
            .bind(&patch.name)
            .bind(&patch.description)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to update category", e))?
            .ok_or(RepositoryError::NotFound {
                entity: "Category",
                id,
            })?;

            Ok(row.into())
        })
    }

    fn delete_category(&self, id: i64) -> RepoFuture<'_, DeleteOutcome> {
        Box::pin(async move {
            match sqlx::query("DELETE FROM categories WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| map_db_error("Failed to delete category", e))
            {
                Ok(result) if result.rows_affected() == 0 => Ok(DeleteOutcome::NotFound),
                Ok(_) => Ok(DeleteOutcome::Deleted),
                Err(RepositoryError::Integrity(reason)) => {
                    tracing::debug!(category_id = id, %reason, "Category still referenced");
                    Ok(DeleteOutcome::InUse)
                },
                Err(e) => Err(e),
            }
        })
    }

    fn count_categories(&self) -> RepoFuture<'_, i64> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM categories")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_db_error("Failed to count categories", e))?;
            Ok(count)
        })
    }

    fn list_products(&self) -> RepoFuture<'_, Vec<Product>> {
        Box::pin(async move {
            let query = format!(
                "{PRODUCT_SELECT} FROM products p JOIN categories c ON c.id = p.category_id ORDER BY p.id"
            );
            let rows = sqlx::query_as::<_, ProductRow>(&query)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_db_error("Failed to list products", e))?;

            Ok(rows.into_iter().map(Product::from).collect())
        })
    }

    fn find_product(&self, id: i64) -> RepoFuture<'_, Option<Product>> {
        Box::pin(async move {
            let query = format!(
                "{PRODUCT_SELECT} FROM products p JOIN categories c ON c.id = p.category_id WHERE p.id = $1"
            );
            let row = sqlx::query_as::<_, ProductRow>(&query)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_db_error("Failed to load product", e))?;

            Ok(row.map(Product::from))
        })
    }

    fn product_exists(&self, id: i64) -> RepoFuture<'_, bool> {
        Box::pin(async move {
            let (exists,): (bool,) =
                sqlx::query_as("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| map_db_error("Failed to check product", e))?;
            Ok(exists)
        })
    }

    fn list_products_by_category(&self, category_id: i64) -> RepoFuture<'_, Vec<Product>> {
        Box::pin(async move {
            let query = format!(
                "{PRODUCT_SELECT} FROM products p JOIN categories c ON c.id = p.category_id \
                 WHERE p.category_id = $1 ORDER BY p.id"
            );
            let rows = sqlx::query_as::<_, ProductRow>(&query)
                .bind(category_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_db_error("Failed to list products by category", e))?;

            Ok(rows.into_iter().map(Product::from).collect())
        })
    }

    fn insert_product(&self, input: NewProduct) -> RepoFuture<'_, Product> {
        Box::pin(async move {
            let query = format!(
                r"
                WITH p AS (
                    INSERT INTO products (name, description, price, stock_quantity, category_id)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING *
                )
                {PRODUCT_SELECT} FROM p JOIN categories c ON c.id = p.category_id
                "
            );
            let row = sqlx::query_as::<_, ProductRow>(&query)
                .bind(&input.name)
                .bind(&input.description)
                .bind(input.price)
                .bind(input.stock_quantity)
                .bind(input.category_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| category_violation(input.category_id, map_db_error("Failed to insert product", e)))?;

            tracing::debug!(product_id = row.id, category_id = row.category_id, "Product inserted");
            Ok(row.into())
        })
    }

    fn update_product(&self, product: Product) -> RepoFuture<'_, Product> {
        Box::pin(async move {
            let query = format!(
                r"
                WITH p AS (
                    UPDATE products
                    SET name = $2, description = $3, price = $4, stock_quantity = $5,
                        category_id = $6, updated_at = now()
                    WHERE id = $1
                    RETURNING *
                )
                {PRODUCT_SELECT} FROM p JOIN categories c ON c.id = p.category_id
                "
            );
            let row = sqlx::query_as::<_, ProductRow>(&query)
                .bind(product.id)
                .bind(&product.name)
                .bind(&product.description)
                .bind(product.price)
                .bind(product.stock_quantity)
                .bind(product.category.id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    category_violation(product.category.id, map_db_error("Failed to update product", e))
                })?
                .ok_or(RepositoryError::NotFound {
                    entity: "Product",
                    id: product.id,
                })?;

            Ok(row.into())
        })
    }

    fn delete_product(&self, id: i64) -> RepoFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM products WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| map_db_error("Failed to delete product", e))?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn count_products(&self) -> RepoFuture<'_, i64> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_db_error("Failed to count products", e))?;
            Ok(count)
        })
    }
}
