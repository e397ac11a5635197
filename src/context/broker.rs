use anyhow::anyhow;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::context::credential::Credential;
use crate::context::error::ContextError;
use crate::context::pool::{ConnectionPool, SessionConnection, SessionVariables};
use crate::context::settings::SessionSettings;

/// Session variable receiving the default role.
pub const ROLE_SETTING: &str = "role";

/// Default session variable carrying the caller's bearer token.
pub const DEFAULT_CREDENTIAL_SETTING: &str = "jwt.token";

struct Held<C> {
    connection: C,
    session_applied: bool,
}

type Slot<C> = Arc<Mutex<Option<Held<C>>>>;

/// Exclusive access to a request's connection for the duration of a query.
pub type ConnectionLease<'a, C> = MappedMutexGuard<'a, C>;

/// Options controlling how the caller's identity is applied to a connection.
#[derive(Clone, Debug)]
pub struct BrokerOptions {
    /// Role applied when the session settings do not name one.
    pub default_role: Option<String>,
    /// Session variable the bearer token is exposed under, if any.
    pub credential_setting: Option<String>,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            default_role: None,
            credential_setting: Some(DEFAULT_CREDENTIAL_SETTING.to_string()),
        }
    }
}

impl BrokerOptions {
    /// Session variables for one request, in the order they are applied.
    #[must_use]
    pub fn session_variables(
        &self,
        credential: Option<&Credential>,
        settings: Option<&SessionSettings>,
    ) -> SessionVariables {
        let mut variables = SessionVariables::new();
        if let Some(role) = &self.default_role {
            variables.push((ROLE_SETTING.to_string(), role.clone()));
        }
        if let Some(settings) = settings {
            variables.extend(settings.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        }
        if let (Some(key), Some(credential)) = (&self.credential_setting, credential) {
            variables.push((key.clone(), credential.as_str().to_string()));
        }
        variables
    }
}

/// The per-request bundle handed to GraphQL execution: the checked-out
/// connection together with the caller's identity and settings.
pub struct ResourceContext<C> {
    slot: Slot<C>,
    credential: Option<Credential>,
    settings: Option<SessionSettings>,
    variables: SessionVariables,
}

impl<C: Send + 'static> ResourceContext<C> {
    /// Locks the request's connection. Fails once the connection has been
    /// released.
    pub async fn connection(&self) -> Result<ConnectionLease<'_, C>, ContextError> {
        let slot = self.slot.lock().await;
        MutexGuard::try_map(slot, |held| held.as_mut().map(|held| &mut held.connection))
            .map_err(|_| ContextError::ConnectionReleased)
    }

    #[must_use]
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    #[must_use]
    pub fn settings(&self) -> Option<&SessionSettings> {
        self.settings.as_ref()
    }

    /// The variables applied to the connection, credential included.
    #[must_use]
    pub fn variables(&self) -> &SessionVariables {
        &self.variables
    }
}

/// Single-use capability returning one connection to the pool it came from.
///
/// `release` may be called any number of times; only the first call clears
/// the session and checks the connection back in. A guard dropped without
/// being released schedules the release on the current runtime, or discards
/// the connection when there is no runtime to run it on.
pub struct ReleaseGuard<P: ConnectionPool> {
    pool: Arc<P>,
    slot: Slot<P::Connection>,
}

impl<P: ConnectionPool> ReleaseGuard<P> {
    fn new(pool: Arc<P>, connection: P::Connection) -> Self {
        let held = Held {
            connection,
            session_applied: false,
        };
        Self {
            pool,
            slot: Arc::new(Mutex::new(Some(held))),
        }
    }

    async fn apply(&self, variables: &SessionVariables) -> anyhow::Result<()> {
        let mut slot = self.slot.lock().await;
        let Some(held) = slot.as_mut() else {
            return Err(anyhow!("connection was released before its session was applied"));
        };
        held.session_applied = true;
        held.connection.apply_session(variables).await
    }

    /// Clears the session and returns the connection. Never fails; problems
    /// are logged.
    pub async fn release(&self) {
        let held = self.slot.lock().await.take();
        if let Some(held) = held {
            release_held(self.pool.as_ref(), held).await;
        }
    }
}

impl<P: ConnectionPool> Drop for ReleaseGuard<P> {
    fn drop(&mut self) {
        let runtime = Handle::try_current().ok();

        let held = match self.slot.try_lock() {
            Ok(mut slot) => match slot.take() {
                Some(held) => held,
                None => return,
            },
            Err(_) => {
                // A lease is still out; wait for it before taking the connection.
                let Some(handle) = runtime else {
                    warn!("Release guard dropped outside a runtime while its connection was leased");
                    return;
                };
                debug!("Release guard dropped while leased, scheduling release");
                let pool = self.pool.clone();
                let slot = self.slot.clone();
                handle.spawn(async move {
                    let held = slot.lock().await.take();
                    if let Some(held) = held {
                        release_held(pool.as_ref(), held).await;
                    }
                });
                return;
            }
        };

        match runtime {
            Some(handle) => {
                debug!("Release guard dropped before release, scheduling release");
                let pool = self.pool.clone();
                handle.spawn(async move { release_held(pool.as_ref(), held).await });
            }
            None => {
                warn!("Release guard dropped outside a runtime, discarding connection");
                self.pool.discard(held.connection);
            }
        }
    }
}

async fn release_held<P: ConnectionPool>(pool: &P, held: Held<P::Connection>) {
    let Held {
        mut connection,
        session_applied,
    } = held;

    if !session_applied {
        pool.release(connection);
        debug!("Connection released");
        return;
    }

    match connection.reset_session().await {
        Ok(()) => {
            pool.release(connection);
            debug!("Session cleared and connection released");
        }
        Err(err) => {
            warn!(error = %err, "Failed to clear session state, discarding connection");
            pool.discard(connection);
        }
    }
}

/// Checks connections out of a pool with the caller's session applied.
pub struct ContextBroker<P: ConnectionPool> {
    pool: Arc<P>,
    options: BrokerOptions,
}

impl<P: ConnectionPool> ContextBroker<P> {
    pub fn new(pool: Arc<P>, options: BrokerOptions) -> Self {
        Self { pool, options }
    }

    /// Acquires a connection and applies the caller's session to it.
    ///
    /// The connection is never handed out without its session: if applying
    /// the session fails, the connection is released before the error is
    /// returned.
    ///
    /// # Errors
    /// [`ContextError::Acquisition`] when the pool has no connection to give,
    /// [`ContextError::SettingsApplication`] when the session cannot be applied.
    pub async fn acquire(
        &self,
        credential: Option<Credential>,
        settings: Option<SessionSettings>,
    ) -> Result<(ResourceContext<P::Connection>, ReleaseGuard<P>), ContextError> {
        let variables = self
            .options
            .session_variables(credential.as_ref(), settings.as_ref());

        let connection = self
            .pool
            .acquire()
            .await
            .map_err(ContextError::Acquisition)?;
        let guard = ReleaseGuard::new(self.pool.clone(), connection);

        if !variables.is_empty() {
            if let Err(err) = guard.apply(&variables).await {
                guard.release().await;
                return Err(ContextError::SettingsApplication(err));
            }
        }

        let context = ResourceContext {
            slot: guard.slot.clone(),
            credential,
            settings,
            variables,
        };
        Ok((context, guard))
    }
}
