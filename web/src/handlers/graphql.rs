//! GraphQL over HTTP.

use crate::auth::MaybePrincipal;
use crate::state::AppState;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;

/// Execute a query or mutation.
///
/// The authenticated principal, if any, is attached to the request data
/// where mutation resolvers look for it.
///
/// # Endpoint
///
/// ```text
/// POST /graphql
/// ```
pub async fn execute(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let mut request = request.into_inner();
    if let Some(principal) = principal {
        tracing::debug!(username = %principal.username, "GraphQL request");
        request = request.data(principal);
    }
    state.schema.execute(request).await.into()
}
