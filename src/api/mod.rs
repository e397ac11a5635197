pub mod graphql;
pub mod handlers;

use axum::{
    extract::Extension,
    routing::get,
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::api::graphql::GatewaySchema;
use crate::context::RequestLifecycle;

/// Builds the HTTP router serving GraphQL, the playground and health checks.
pub fn router(schema: GatewaySchema, lifecycle: Arc<RequestLifecycle<PgPool>>) -> Router {
    Router::new()
        .route(
            "/graphql",
            get(handlers::graphql_playground).post(handlers::graphql_handler),
        )
        .route("/graphql/playground", get(handlers::graphql_playground))
        .route("/health", get(handlers::health_check))
        .layer(Extension(schema))
        .layer(Extension(lifecycle))
        .layer(CorsLayer::permissive())
}
