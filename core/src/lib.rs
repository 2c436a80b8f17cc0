//! # Catalog Core
//!
//! Domain types and seams for the product catalog service.
//!
//! This crate has no I/O of its own. It defines:
//!
//! - **Model**: [`model::Category`], [`model::Product`] and their create/patch inputs
//! - **Users**: [`user::User`], [`user::Role`] and salted password hashes
//! - **Events**: [`event::ProductEvent`] (what mutations publish) and
//!   [`event::DashboardEvent`] (what the dashboard receives)
//! - **Records**: broker-neutral [`record::OutboundRecord`] / [`record::BrokerRecord`]
//! - **Traits**: [`repository::CatalogRepository`], [`repository::UserRepository`],
//!   [`event_bus::EventBus`]
//!
//! ## Update path
//!
//! ```text
//! mutation ──► repository (persist) ──► EventBus::publish("product-events")
//!                                              │
//!                                              ▼
//!                                    consumer ──► dashboard subscribers
//! ```
//!
//! Implementations live in `catalog-postgres`, `catalog-redpanda` and
//! `catalog-testing`.

pub mod error;
pub mod event;
pub mod event_bus;
pub mod model;
pub mod record;
pub mod repository;
pub mod user;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use rust_decimal::Decimal;

pub use error::CatalogError;

/// Environment abstractions injected into services.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use catalog_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let first = clock.now();
    /// assert!(clock.now() >= first);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

/// Well-known topic names.
pub mod topics {
    /// Topic product mutations are published to.
    pub const PRODUCT_EVENTS: &str = "product-events";

    /// Suffix appended to a topic name to form its dead-letter topic.
    pub const DLT_SUFFIX: &str = ".DLT";

    /// Broadcaster topic the dashboard WebSocket listens on.
    pub const DASHBOARD_EVENTS: &str = "/topic/events";

    /// Dead-letter topic for `topic`.
    ///
    /// ```
    /// assert_eq!(catalog_core::topics::dead_letter("product-events"), "product-events.DLT");
    /// ```
    #[must_use]
    pub fn dead_letter(topic: &str) -> String {
        format!("{topic}{DLT_SUFFIX}")
    }

    /// Internal topics (consumer offsets, schemas, ...) start with an underscore.
    #[must_use]
    pub fn is_internal(topic: &str) -> bool {
        topic.starts_with('_')
    }
}

#[cfg(test)]
mod tests {
    use super::topics;

    #[test]
    fn internal_topics_are_detected() {
        assert!(topics::is_internal("__consumer_offsets"));
        assert!(topics::is_internal("_schemas"));
        assert!(!topics::is_internal("product-events"));
        assert!(!topics::is_internal("product-events.DLT"));
    }
}
