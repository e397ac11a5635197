//! Error types for the request context lifecycle.

use async_graphql::ErrorExtensions;
use thiserror::Error;

/// Errors raised while building or using a request's resource context.
///
/// The first three variants are construction failures: they happen before the
/// request reaches the active state and are reported to the caller as a
/// GraphQL error, never as a process failure.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The session settings callback failed. No connection was acquired.
    #[error("failed to resolve session settings: {0}")]
    SettingsResolution(#[source] anyhow::Error),

    /// The pool could not supply a connection.
    #[error("failed to acquire a database connection: {0}")]
    Acquisition(#[source] anyhow::Error),

    /// A connection was acquired but the session could not be applied to it.
    /// The connection has already been released when this is returned.
    #[error("failed to apply session settings to the connection: {0}")]
    SettingsApplication(#[source] anyhow::Error),

    /// The connection was used after its release capability ran.
    #[error("the request's database connection has already been released")]
    ConnectionReleased,

    /// The operation-resolved hook fired twice for one request.
    #[error("a resource context was already resolved for this request")]
    AlreadyResolved,
}

impl ContextError {
    /// Stable code reported in the GraphQL error's `extensions.code`.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::SettingsResolution(_) => "SETTINGS_RESOLUTION_FAILED",
            Self::Acquisition(_) => "CONNECTION_ACQUISITION_FAILED",
            Self::SettingsApplication(_) => "SETTINGS_APPLICATION_FAILED",
            Self::ConnectionReleased => "CONNECTION_RELEASED",
            Self::AlreadyResolved => "ALREADY_RESOLVED",
        }
    }
}

impl ErrorExtensions for ContextError {
    fn extend(&self) -> async_graphql::Error {
        let code = self.code();
        async_graphql::Error::new(self.to_string()).extend_with(|_, e| e.set("code", code))
    }
}
