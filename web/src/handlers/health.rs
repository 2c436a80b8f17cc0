//! Health check endpoints.
//!
//! These endpoints are used by load balancers and container orchestrators
//! to verify service health.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

/// Readiness report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    /// `ready` or `unavailable`
    pub status: &'static str,
    /// Database reachable
    pub database: bool,
    /// Broker reachable; `None` when event streaming is disabled
    pub broker: Option<bool>,
}

/// Liveness probe. Does not touch any dependency.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness probe.
///
/// Returns `200` when the database answers, `503` otherwise. The broker is
/// reported but does not affect the status code: the catalog keeps serving
/// when event publishing is degraded.
///
/// # Endpoint
///
/// ```text
/// GET /ready
/// ```
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let database = match state.categories.find_all_categories().await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness: database check failed");
            false
        },
    };

    let broker = match &state.bus {
        Some(bus) => Some(match bus.list_topics().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Readiness: broker check failed");
                false
            },
        }),
        None => None,
    };

    let (status, label) = if database {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    (
        status,
        Json(Readiness {
            status: label,
            database,
            broker,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
