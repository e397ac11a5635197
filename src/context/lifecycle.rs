use async_graphql::{
    ErrorExtensions, ObjectType, Request, Response, Schema, ServerError, SubscriptionType,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::broker::{BrokerOptions, ContextBroker, ReleaseGuard, ResourceContext};
use crate::context::credential::extract_credential;
use crate::context::error::ContextError;
use crate::context::pool::ConnectionPool;
use crate::context::settings::{InboundRequest, SettingsResolver};

/// Where a request is in its context lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeState {
    Idle,
    Acquiring,
    Active,
    /// Terminal. Also reached when acquisition fails partway; the broker has
    /// already returned the connection by then.
    Released,
}

/// Process-wide adapter binding the context broker to request handling.
///
/// It holds no per-request state; every request gets its own
/// [`RequestScope`] from [`RequestLifecycle::begin`].
pub struct RequestLifecycle<P: ConnectionPool> {
    broker: ContextBroker<P>,
    settings: SettingsResolver,
}

impl<P: ConnectionPool> RequestLifecycle<P> {
    pub fn new(pool: Arc<P>, settings: SettingsResolver, options: BrokerOptions) -> Self {
        Self {
            broker: ContextBroker::new(pool, options),
            settings,
        }
    }

    #[must_use]
    pub fn begin(&self) -> RequestScope<'_, P> {
        RequestScope {
            lifecycle: self,
            state: ScopeState::Idle,
            release: None,
        }
    }
}

/// One request's slot for its pending release capability.
pub struct RequestScope<'a, P: ConnectionPool> {
    lifecycle: &'a RequestLifecycle<P>,
    state: ScopeState,
    release: Option<ReleaseGuard<P>>,
}

impl<P: ConnectionPool> RequestScope<'_, P> {
    #[must_use]
    pub fn state(&self) -> ScopeState {
        self.state
    }

    /// Builds the request's resource context once the operation is known.
    ///
    /// # Errors
    /// Any construction failure from settings resolution or the broker, or
    /// [`ContextError::AlreadyResolved`] when called a second time.
    pub async fn operation_resolved(
        &mut self,
        request: &InboundRequest,
    ) -> Result<ResourceContext<P::Connection>, ContextError> {
        if self.state != ScopeState::Idle {
            return Err(ContextError::AlreadyResolved);
        }
        self.state = ScopeState::Acquiring;

        match self.construct(request).await {
            Ok((context, guard)) => {
                self.release = Some(guard);
                self.state = ScopeState::Active;
                debug!(
                    authenticated = context.credential().is_some(),
                    variables = context.variables().len(),
                    "Request context active"
                );
                Ok(context)
            }
            Err(err) => {
                self.state = ScopeState::Released;
                warn!(error = %err, code = err.code(), "Failed to build request context");
                Err(err)
            }
        }
    }

    async fn construct(
        &self,
        request: &InboundRequest,
    ) -> Result<(ResourceContext<P::Connection>, ReleaseGuard<P>), ContextError> {
        let credential = extract_credential(&request.headers);
        let settings = self.lifecycle.settings.resolve(request).await?;
        self.lifecycle.broker.acquire(credential, settings).await
    }

    /// Releases the request's connection, if it holds one. Safe to call
    /// whether or not the context was ever built, and more than once.
    pub async fn response_finalized(&mut self) {
        if let Some(guard) = self.release.take() {
            guard.release().await;
        }
        if self.state == ScopeState::Active {
            self.state = ScopeState::Released;
        }
    }
}

/// Executes a GraphQL request with a freshly built resource context merged
/// into its data, releasing the connection once the response is ready.
///
/// Construction failures produce an error response; they never reach the
/// schema.
pub async fn execute_with_context<P, Query, Mutation, Subscription>(
    schema: &Schema<Query, Mutation, Subscription>,
    lifecycle: &RequestLifecycle<P>,
    inbound: &InboundRequest,
    request: Request,
) -> Response
where
    P: ConnectionPool,
    Query: ObjectType + 'static,
    Mutation: ObjectType + 'static,
    Subscription: SubscriptionType + 'static,
{
    let mut scope = lifecycle.begin();
    let context = match scope.operation_resolved(inbound).await {
        Ok(context) => context,
        Err(err) => return error_response(&err),
    };

    let response = schema.execute(request.data(context)).await;
    scope.response_finalized().await;
    response
}

fn error_response(err: &ContextError) -> Response {
    let mut error = ServerError::new(err.to_string(), None);
    error.extensions = err.extend().extensions;
    Response::from_errors(vec![error])
}
