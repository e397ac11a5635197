pub mod api;
pub mod context;
pub mod options;

pub use options::GatewayOptions;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use crate::api::graphql::{context::ApiContext, create_schema};
use crate::context::RequestLifecycle;

pub struct Gateway {
    options: GatewayOptions,
}

impl Gateway {
    pub fn new(options: GatewayOptions) -> Self {
        Self { options }
    }

    /// Connects the pool and serves the API until the server stops.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable, the configuration is
    /// invalid, or the server fails to bind or exits with an error
    pub async fn run(&self) -> Result<()> {
        let pool = PgPoolOptions::new()
            .max_connections(self.options.max_connections)
            .connect(&self.options.database_url)
            .await
            .context("Failed to connect to database for API")?;

        let broker_options = self.options.broker_options();
        let settings = self.options.settings_resolver()?;

        let api = ApiContext::new(self.options.schemas.clone())
            .with_credential_setting(broker_options.credential_setting.clone());
        let schema = create_schema(api);

        let lifecycle = Arc::new(RequestLifecycle::new(
            Arc::new(pool),
            settings,
            broker_options,
        ));

        let api_router = crate::api::router(schema, lifecycle);

        let addr = format!("{}:{}", self.options.host, self.options.port)
            .parse::<SocketAddr>()
            .context("Invalid socket address")?;
        info!("Starting API server on {}", addr);

        let server = axum::Server::try_bind(&addr)
            .with_context(|| format!("Failed to bind API server to {addr}"))?
            .serve(api_router.into_make_service());

        if let Err(err) = server.await {
            error!("API server exited: {:?}", err);
            return Err(anyhow::anyhow!("API server error: {}", err));
        }

        Ok(())
    }
}
