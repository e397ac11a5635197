pub mod context;
pub mod resolvers;
pub mod schema;
pub mod types;

pub use resolvers::QueryRoot;
pub use schema::{create_schema, GatewaySchema};
pub use types::*;
