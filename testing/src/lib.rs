//! # Catalog Testing
//!
//! Test doubles and helpers for the product catalog.
//!
//! This crate provides:
//! - [`InMemoryCatalogRepository`] / [`InMemoryUserRepository`]: `BTreeMap`-backed repositories
//! - [`InMemoryEventBus`]: records every publish and fans records out to subscribers
//! - [`FixedClock`]: deterministic time
//! - [`fixtures`]: inputs shaped like the seed data
//!
//! ## Example
//!
//! ```
//! use catalog_core::repository::CatalogRepository;
//! use catalog_testing::{InMemoryCatalogRepository, fixtures};
//!
//! # tokio_test::block_on(async {
//! let repo = InMemoryCatalogRepository::new();
//! let books = repo.insert_category(fixtures::new_category("Books")).await.unwrap();
//! let product = repo.insert_product(fixtures::new_product("Effective Java", books.id)).await.unwrap();
//! assert_eq!(product.category.name, "Books");
//! # });
//! ```

mod event_bus;
mod repositories;

pub use event_bus::InMemoryEventBus;
pub use repositories::{InMemoryCatalogRepository, InMemoryUserRepository};

use chrono::{DateTime, Utc};
use catalog_core::environment::Clock;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// # Example
    ///
    /// ```
    /// use catalog_testing::mocks::FixedClock;
    /// use catalog_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Fixed clock set to 2025-01-01 00:00:00 UTC.
    #[must_use]
    pub fn test_clock() -> FixedClock {
        // 2025-01-01T00:00:00Z
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

/// Inputs mirroring the seeded catalog.
pub mod fixtures {
    use catalog_core::model::{NewCategory, NewProduct, ProductPatch};
    use catalog_core::user::{NewUser, Role};
    use rust_decimal::Decimal;

    /// Category input without description.
    #[must_use]
    pub fn new_category(name: &str) -> NewCategory {
        NewCategory::new(name, None)
    }

    /// Product input priced at 19.99 with 10 units.
    #[must_use]
    pub fn new_product(name: &str, category_id: i64) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            description: Some(format!("{name} description")),
            price: Decimal::new(1999, 2),
            stock_quantity: 10,
            category_id,
        }
    }

    /// Patch that only changes the stock quantity.
    #[must_use]
    pub fn restock(quantity: i32) -> ProductPatch {
        ProductPatch {
            stock_quantity: Some(quantity),
            ..ProductPatch::default()
        }
    }

    /// `admin` / `admin` with every role.
    #[must_use]
    pub fn admin_user() -> NewUser {
        NewUser::new("admin", "admin@example.com", "admin", &Role::ALL).with_names("Admin", "User")
    }

    /// `user` / `password` with `ROLE_USER`.
    #[must_use]
    pub fn regular_user() -> NewUser {
        NewUser::new("user", "user@example.com", "password", &[Role::User])
            .with_names("Regular", "User")
    }
}

/// Install a test-friendly tracing subscriber.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn fixtures_are_valid() {
        assert!(fixtures::new_category("Books").validate().is_ok());
        assert!(fixtures::new_product("Pen", 1).validate().is_ok());
        assert!(fixtures::restock(0).validate().is_ok());
    }
}
