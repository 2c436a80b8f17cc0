//! Application lifecycle management and graceful shutdown.
//!
//! When a shutdown signal is received (Ctrl+C or SIGTERM):
//! 1. HTTP servers stop accepting new connections
//! 2. Shutdown signal broadcast to all consumers
//! 3. Wait for consumers to finish current work (10s timeout)
//! 4. Clean exit

use axum::{Router, routing::get};
use catalog_runtime::EventConsumer;
use catalog_runtime::metrics::MetricsServer;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Running application with all background tasks.
///
/// Owns the listeners, the router and the dashboard consumer, and
/// coordinates their shutdown.
pub struct Application {
    listener: TcpListener,
    app: Router,
    metrics_listener: TcpListener,
    metrics: Arc<MetricsServer>,
    consumer: Option<EventConsumer>,
    concurrency: usize,
    shutdown_tx: broadcast::Sender<()>,
}

impl Application {
    /// Assemble an application from already-connected parts.
    #[must_use]
    pub fn new(
        listener: TcpListener,
        app: Router,
        metrics_listener: TcpListener,
        metrics: MetricsServer,
        consumer: Option<EventConsumer>,
        concurrency: usize,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            listener,
            app,
            metrics_listener,
            metrics: Arc::new(metrics),
            consumer,
            concurrency,
            shutdown_tx,
        }
    }

    /// Run until a shutdown signal arrives, then stop every task.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP server fails.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let consumer_handles = match self.consumer {
            Some(consumer) => {
                info!(concurrency = self.concurrency, "Starting dashboard consumers");
                consumer.spawn_group(self.concurrency)
            },
            None => {
                info!("Dashboard consumer disabled");
                Vec::new()
            },
        };

        let metrics_handle = spawn_metrics(self.metrics_listener, self.metrics, self.shutdown_tx.subscribe());

        info!(address = ?self.listener.local_addr().ok(), "HTTP server listening for requests");
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server stopped, initiating graceful shutdown...");

        // No receivers left is fine
        let _ = self.shutdown_tx.send(());

        Self::await_shutdown(consumer_handles, metrics_handle).await;

        info!("Graceful shutdown complete");
        Ok(())
    }

    async fn await_shutdown(consumer_handles: Vec<JoinHandle<()>>, metrics_handle: JoinHandle<()>) {
        let timeout = Duration::from_secs(10);

        for (idx, handle) in consumer_handles.into_iter().enumerate() {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => info!(consumer = idx, "Consumer stopped gracefully"),
                Ok(Err(e)) => warn!(consumer = idx, error = %e, "Consumer task failed"),
                Err(_) => warn!(consumer = idx, "Consumer shutdown timed out"),
            }
        }

        if tokio::time::timeout(timeout, metrics_handle).await.is_err() {
            warn!("Metrics server shutdown timed out");
        }
    }
}

/// Serve `GET /metrics` until shutdown.
fn spawn_metrics(
    listener: TcpListener,
    metrics: Arc<MetricsServer>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let metrics = Arc::clone(&metrics);
            async move { metrics.render().unwrap_or_default() }
        }),
    );

    tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "Metrics server failed");
        }
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
