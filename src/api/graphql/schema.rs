use async_graphql::{EmptyMutation, EmptySubscription, Schema};

use crate::api::graphql::{
    context::ApiContext,
    resolvers::QueryRoot,
    types::{Session, Setting, Table},
};

/// Type alias for the complete GraphQL schema
#[allow(clippy::module_name_repetitions)]
pub type GatewaySchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

/// Create a new GraphQL schema exposing the namespaces in `api`
#[must_use]
#[allow(clippy::module_name_repetitions)]
pub fn create_schema(api: ApiContext) -> GatewaySchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(api)
        .register_output_type::<Session>()
        .register_output_type::<Setting>()
        .register_output_type::<Table>()
        .finish()
}
