//! Per-request database context: who the caller is, which connection serves
//! them, and the guarantee that the connection goes back to the pool.

pub mod broker;
pub mod credential;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;

pub use broker::{BrokerOptions, ConnectionLease, ContextBroker, ReleaseGuard, ResourceContext};
pub use credential::{extract_credential, Credential};
pub use error::ContextError;
pub use lifecycle::{execute_with_context, RequestLifecycle, RequestScope, ScopeState};
pub use pool::{ConnectionPool, SessionConnection, SessionVariables};
pub use settings::{HeaderSettings, InboundRequest, SessionSettings, SettingsCallback, SettingsResolver};

/// Resource context backed by the production Postgres pool.
pub type PgResourceContext = ResourceContext<sqlx::pool::PoolConnection<sqlx::Postgres>>;
