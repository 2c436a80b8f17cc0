//! Product catalog service.
//!
//! - [`config`]: environment configuration
//! - [`bootstrap`]: connects the database and broker and builds the router
//! - [`lifecycle`]: runs the servers and consumers and shuts them down

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bootstrap;
pub mod config;
pub mod lifecycle;

pub use bootstrap::{StartupError, build};
pub use config::{Config, ConfigError};
pub use lifecycle::Application;
