//! Product catalog server.
//!
//! # Usage
//!
//! Needs `PostgreSQL` and, unless `KAFKA_ENABLED=false`, a Kafka-compatible
//! broker. Settings are read from the environment; see `.env.example`.
//!
//! ```bash
//! cargo run --bin catalog-server
//! ```

use catalog_server::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting catalog server...");

    let config = Config::from_env().inspect_err(|e| tracing::error!(error = %e, "Invalid configuration"))?;
    tracing::info!(
        address = %config.server.bind_address(),
        kafka_enabled = config.kafka.enabled,
        brokers = %config.kafka.brokers,
        "Configuration loaded"
    );

    let app = catalog_server::build(config)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Start-up failed"))?;

    app.run().await
}
