//! `PostgreSQL` repositories for the product catalog.
//!
//! - [`PostgresCatalogRepository`]: categories and products
//! - [`PostgresUserRepository`]: users and roles
//!
//! Schema changes live in `migrations/` and are applied with [`migrate`].
//!
//! # Example
//!
//! ```no_run
//! use catalog_postgres::{PostgresCatalogRepository, connect, migrate};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("postgres://localhost/catalog", 10).await?;
//! migrate(&pool).await?;
//! let repo = PostgresCatalogRepository::new(pool);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod users;

pub use catalog::PostgresCatalogRepository;
pub use users::PostgresUserRepository;

use catalog_core::repository::RepositoryError;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`RepositoryError::Database`] if no connection can be established.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, RepositoryError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to connect: {e}")))?;

    tracing::info!(max_connections, "PostgreSQL pool ready");
    Ok(pool)
}

/// Apply pending migrations.
///
/// # Errors
///
/// Returns [`RepositoryError::Database`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), RepositoryError> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Migration failed: {e}")))?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Translate a sqlx error, recognising constraint violations.
pub(crate) fn map_db_error(context: &str, err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return RepositoryError::Conflict(db_err.message().to_string());
        }
        if db_err.is_foreign_key_violation() {
            return RepositoryError::Integrity(db_err.message().to_string());
        }
    }
    RepositoryError::Database(format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_keep_context() {
        let err = map_db_error("Failed to list products", sqlx::Error::RowNotFound);
        assert!(
            matches!(err, RepositoryError::Database(ref msg) if msg.starts_with("Failed to list products"))
        );
    }

    #[test]
    fn migrations_are_embedded() {
        assert!(MIGRATOR.iter().count() >= 2);
    }
}
