//! Prometheus metrics for the catalog service.
//!
//! Counters cover the event path end to end:
//! - products created through the API
//! - product events published (and failed publishes)
//! - records forwarded to a dead-letter topic
//! - records relayed to the dashboard
//!
//! # Example
//!
//! ```rust,no_run
//! use catalog_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Serve `server.render()` at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder plus the address its scrape endpoint is served on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server for `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape endpoint should listen on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Describe all metrics and install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// A second installation in the same process (tests) is tolerated: the
    /// call succeeds and [`Self::handle`] stays `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics available at http://{}/metrics", self.addr);
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "catalog_products_created_total",
        "Total number of products created through the API"
    );
    describe_counter!(
        "catalog_events_published_total",
        "Total number of product events published to the broker"
    );
    describe_counter!(
        "catalog_events_publish_failed_total",
        "Total number of product events the broker rejected"
    );
    describe_histogram!(
        "catalog_event_publish_duration_seconds",
        "Time taken to publish a product event"
    );
    describe_counter!(
        "catalog_dlt_forwarded_total",
        "Total number of records forwarded to a dead-letter topic"
    );
    describe_counter!(
        "catalog_dashboard_events_total",
        "Total number of consumed records relayed to the dashboard"
    );
}

/// Catalog metrics recorder.
pub struct CatalogMetrics;

impl CatalogMetrics {
    /// Record a product creation.
    pub fn record_product_created() {
        counter!("catalog_products_created_total").increment(1);
    }

    /// Record a successful event publish.
    pub fn record_published(topic: &str, duration: Duration) {
        counter!("catalog_events_published_total", "topic" => topic.to_string()).increment(1);
        histogram!("catalog_event_publish_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a failed event publish.
    pub fn record_publish_failed(topic: &str) {
        counter!("catalog_events_publish_failed_total", "topic" => topic.to_string()).increment(1);
    }

    /// Record a record forwarded to a dead-letter topic.
    pub fn record_dead_lettered(topic: &str) {
        counter!("catalog_dlt_forwarded_total", "topic" => topic.to_string()).increment(1);
    }

    /// Record a record relayed to dashboard subscribers.
    pub fn record_dashboard_event() {
        counter!("catalog_dashboard_events_total").increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn new_server_has_no_handle() {
        let server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn start_tolerates_repeated_installation() {
        let mut first = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        let mut second = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(first.start().is_ok());
        assert!(second.start().is_ok());
    }

    #[test]
    fn recorded_counters_are_rendered() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        server.start().unwrap();

        CatalogMetrics::record_product_created();
        CatalogMetrics::record_published("product-events", Duration::from_millis(3));
        CatalogMetrics::record_dead_lettered("product-events");

        // Another test may own the global recorder
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("catalog_products_created_total"));
            assert!(rendered.contains("catalog_events_published_total"));
            assert!(rendered.contains("catalog_dlt_forwarded_total"));
        }
    }
}
