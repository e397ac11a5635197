use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};

/// Ordered `(name, value)` pairs applied to a connection for one request.
pub type SessionVariables = Vec<(String, String)>;

/// A source of exclusively-owned database connections.
///
/// The gateway never sizes or health-checks the pool; it only borrows one
/// connection per request and hands it back.
#[async_trait]
pub trait ConnectionPool: Send + Sync + 'static {
    type Connection: SessionConnection;

    async fn acquire(&self) -> Result<Self::Connection>;

    /// Returns a clean connection to the pool.
    fn release(&self, connection: Self::Connection);

    /// Disposes of a connection whose session state could not be cleared.
    fn discard(&self, connection: Self::Connection) {
        self.release(connection);
    }
}

/// Session-scoped state on a single connection.
#[async_trait]
pub trait SessionConnection: Send + 'static {
    async fn apply_session(&mut self, variables: &SessionVariables) -> Result<()>;

    async fn reset_session(&mut self) -> Result<()>;
}

#[async_trait]
impl ConnectionPool for PgPool {
    type Connection = PoolConnection<Postgres>;

    async fn acquire(&self) -> Result<Self::Connection> {
        sqlx::Pool::acquire(self)
            .await
            .context("Failed to check out a connection from the pool")
    }

    fn release(&self, connection: Self::Connection) {
        drop(connection);
    }

    fn discard(&self, connection: Self::Connection) {
        // A detached connection is closed when dropped instead of rejoining the pool.
        drop(connection.detach());
    }
}

#[async_trait]
impl SessionConnection for PoolConnection<Postgres> {
    async fn apply_session(&mut self, variables: &SessionVariables) -> Result<()> {
        sqlx::query("SELECT set_config(el->>0, el->>1, false) FROM jsonb_array_elements($1) el")
            .bind(Json(variables))
            .execute(&mut **self)
            .await
            .context("Failed to set session variables")?;
        Ok(())
    }

    async fn reset_session(&mut self) -> Result<()> {
        // Role first, then every other session-scoped variable.
        sqlx::query("RESET ROLE")
            .execute(&mut **self)
            .await
            .context("Failed to reset session role")?;
        sqlx::query("RESET ALL")
            .execute(&mut **self)
            .await
            .context("Failed to reset session variables")?;
        Ok(())
    }
}
