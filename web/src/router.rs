//! Router composition.

use crate::handlers::{dashboard, graphql, health, pages};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use async_graphql_axum::GraphQLSubscription;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Which optional route groups to mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterOptions {
    /// Mount `/kafka-ui` and `/ws/events`
    pub dashboard: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self { dashboard: true }
    }
}

/// Create the application router.
///
/// # Routes
///
/// ## GraphQL
/// - `POST /graphql` - queries and mutations
/// - `GET /graphql/ws` - subscriptions (`graphql-transport-ws`)
/// - `GET /graphql-console` - GraphiQL
///
/// ## Pages
/// - `GET /` - catalog home page
///
/// ## Dashboard (optional)
/// - `GET /kafka-ui` - event dashboard
/// - `GET /kafka-ui/topics` - broker topics
/// - `GET /ws/events` - dashboard socket
///
/// ## Health
/// - `GET /health` - liveness
/// - `GET /ready` - readiness
pub fn router(state: AppState, options: RouterOptions) -> Router {
    let mut app = Router::new()
        .route("/", get(pages::home))
        .route("/graphql", post(graphql::execute))
        .route_service("/graphql/ws", GraphQLSubscription::new(state.schema.clone()))
        .route("/graphql-console", get(pages::graphql_console))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness));

    if options.dashboard {
        app = app
            .route("/kafka-ui", get(dashboard::page))
            .route("/kafka-ui/topics", get(dashboard::list_topics))
            .route("/ws/events", get(dashboard::events_socket));
    }

    app.with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
}
