//! Catalog-level error taxonomy.
//!
//! Services return [`CatalogError`]; the web layer maps each variant to a
//! GraphQL error code or HTTP status.

use crate::repository::RepositoryError;
use thiserror::Error;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors surfaced by catalog services.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// A referenced record does not exist.
    #[error("{entity} not found with id: {id}")]
    NotFound {
        /// Entity kind ("Product", "Category")
        entity: &'static str,
        /// Requested id
        id: i64,
    },

    /// Input failed validation.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The write conflicts with existing data (duplicate name, ...).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CatalogError {
    /// Product `id` not found.
    #[must_use]
    pub const fn product_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "Product",
            id,
        }
    }

    /// Category `id` not found.
    #[must_use]
    pub const fn category_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "Category",
            id,
        }
    }

    /// Stable machine-readable code for clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "BAD_REQUEST",
            Self::Conflict(_) => "CONFLICT",
            Self::Storage(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<RepositoryError> for CatalogError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(msg) | RepositoryError::Integrity(msg) => Self::Conflict(msg),
            RepositoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepositoryError::Database(msg) => Self::Storage(msg),
        }
    }
}
