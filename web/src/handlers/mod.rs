//! HTTP request handlers.
//!
//! This module contains all HTTP handlers organized by concern.

pub mod dashboard;
pub mod graphql;
pub mod health;
pub mod pages;

// Re-export common handler utilities
pub use health::{health_check, readiness};
