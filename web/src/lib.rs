//! Web surface of the product catalog.
//!
//! - [`graphql`]: the async-graphql schema (queries, admin-only mutations,
//!   subscriptions)
//! - [`handlers`]: GraphQL over HTTP, server-rendered pages, the event
//!   dashboard and health probes
//! - [`auth`]: HTTP Basic authentication into an optional [`Principal`]
//! - [`middleware`]: correlation ids on every request
//!
//! # Example
//!
//! ```ignore
//! use catalog_web::{AppState, RouterOptions, router};
//!
//! let state = AppState::new(products, categories, users, Some(bus), dashboard);
//! let app = router(state, RouterOptions::default());
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod error;
pub mod graphql;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

// Re-export key types for convenience
pub use auth::{MaybePrincipal, Principal};
pub use error::AppError;
pub use graphql::{CatalogSchema, build_schema};
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId, correlation_id_layer};
pub use router::{RouterOptions, router};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
