mod session;
mod tables;

use async_graphql::Object;

use crate::api::graphql::types::{Session, Table};
use session::resolve_current_session;
use tables::resolve_tables;

/// Root query type that combines all GraphQL queries
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// The database session serving this request
    async fn current_session(&self, ctx: &async_graphql::Context<'_>) -> async_graphql::Result<Session> {
        resolve_current_session(ctx).await
    }

    /// Tables visible to the caller in the exposed schemas
    async fn tables(
        &self,
        ctx: &async_graphql::Context<'_>,
        schema: Option<String>,
    ) -> async_graphql::Result<Vec<Table>> {
        resolve_tables(ctx, schema).await
    }
}
