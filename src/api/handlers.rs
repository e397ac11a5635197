use async_graphql::http::{playground_source, GraphQLPlaygroundConfig};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::Extension,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{Html, IntoResponse},
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::api::graphql::GatewaySchema;
use crate::context::{execute_with_context, InboundRequest, RequestLifecycle};

/// Handler for GraphQL queries and mutations
///
/// Each request is served on its own pooled connection carrying the caller's
/// session, returned to the pool once the response is built.
pub async fn graphql_handler(
    Extension(schema): Extension<GatewaySchema>,
    Extension(lifecycle): Extension<Arc<RequestLifecycle<PgPool>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let inbound = InboundRequest::new(method, uri, headers);
    execute_with_context(&schema, &*lifecycle, &inbound, req.into_inner())
        .await
        .into()
}

/// Handler for the GraphQL playground interface
pub async fn graphql_playground() -> impl IntoResponse {
    Html(playground_source(GraphQLPlaygroundConfig::new("/graphql")))
}

/// Simple health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "Healthy")
}
