use anyhow::{anyhow, Result};
use async_graphql::{Context, EmptyMutation, EmptySubscription, Object, Request, Schema};
use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue};
use pg_graphql_gateway::context::{
    execute_with_context, BrokerOptions, ConnectionPool, InboundRequest, RequestLifecycle,
    ResourceContext, SessionConnection, SessionSettings, SessionVariables, SettingsCallback,
    SettingsResolver,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct PoolState {
    available: AtomicUsize,
    acquired: AtomicUsize,
    releases: AtomicUsize,
    next_id: AtomicUsize,
    fail_apply: AtomicBool,
}

struct MemoryPool(Arc<PoolState>);

impl MemoryPool {
    fn with_capacity(capacity: usize) -> Arc<Self> {
        let state = PoolState::default();
        state.available.store(capacity, Ordering::SeqCst);
        Arc::new(Self(Arc::new(state)))
    }

    fn available(&self) -> usize {
        self.0.available.load(Ordering::SeqCst)
    }

    fn acquired(&self) -> usize {
        self.0.acquired.load(Ordering::SeqCst)
    }

    fn releases(&self) -> usize {
        self.0.releases.load(Ordering::SeqCst)
    }
}

struct MemoryConnection {
    id: usize,
    session: SessionVariables,
    state: Arc<PoolState>,
}

#[async_trait]
impl ConnectionPool for MemoryPool {
    type Connection = MemoryConnection;

    async fn acquire(&self) -> Result<MemoryConnection> {
        tokio::task::yield_now().await;
        self.0
            .available
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_err(|_| anyhow!("no connections available"))?;
        self.0.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            id: self.0.next_id.fetch_add(1, Ordering::SeqCst),
            session: SessionVariables::new(),
            state: self.0.clone(),
        })
    }

    fn release(&self, _connection: MemoryConnection) {
        self.0.releases.fetch_add(1, Ordering::SeqCst);
        self.0.available.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionConnection for MemoryConnection {
    async fn apply_session(&mut self, variables: &SessionVariables) -> Result<()> {
        tokio::task::yield_now().await;
        if self.state.fail_apply.load(Ordering::SeqCst) {
            return Err(anyhow!("role \"admin\" does not exist"));
        }
        self.session = variables.clone();
        Ok(())
    }

    async fn reset_session(&mut self) -> Result<()> {
        self.session.clear();
        Ok(())
    }
}

type MemoryContext = ResourceContext<MemoryConnection>;

struct Query;

#[Object]
impl Query {
    async fn token(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<String>> {
        let request = ctx.data::<MemoryContext>()?;
        Ok(request.credential().map(|c| c.as_str().to_string()))
    }

    async fn connection_id(&self, ctx: &Context<'_>) -> async_graphql::Result<i32> {
        let request = ctx.data::<MemoryContext>()?;
        let connection = request.connection().await?;
        Ok(i32::try_from(connection.id)?)
    }

    async fn setting(&self, ctx: &Context<'_>, name: String) -> async_graphql::Result<Option<String>> {
        let request = ctx.data::<MemoryContext>()?;
        let connection = request.connection().await?;
        Ok(connection
            .session
            .iter()
            .rev()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.clone()))
    }

    async fn fail(&self) -> async_graphql::Result<bool> {
        Err("resolver failed".into())
    }

    async fn explode(&self) -> bool {
        panic!("resolver panicked")
    }
}

type TestSchema = Schema<Query, EmptyMutation, EmptySubscription>;

fn schema() -> TestSchema {
    Schema::new(Query, EmptyMutation, EmptySubscription)
}

fn lifecycle(pool: &Arc<MemoryPool>, settings: SettingsResolver) -> RequestLifecycle<MemoryPool> {
    RequestLifecycle::new(pool.clone(), settings, BrokerOptions::default())
}

fn bearer(token: &'static str) -> InboundRequest {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_static(token));
    headers.into()
}

async fn settle(pool: &MemoryPool, expected: usize) {
    for _ in 0..100 {
        if pool.available() == expected {
            return;
        }
        tokio::task::yield_now().await;
    }
}

struct FailingLookup;

#[async_trait]
impl SettingsCallback for FailingLookup {
    async fn settings(&self, _request: &InboundRequest) -> Result<Option<SessionSettings>> {
        Err(anyhow!("user record lookup failed"))
    }
}

#[tokio::test]
async fn anonymous_request_with_static_settings_returns_its_connection() {
    let pool = MemoryPool::with_capacity(2);
    let settings = SessionSettings::new().with("app.locale", "en");
    let lifecycle = lifecycle(&pool, SettingsResolver::Static(Some(settings)));

    let response = execute_with_context(
        &schema(),
        &lifecycle,
        &HeaderMap::new().into(),
        Request::new(r#"{ token setting(name: "app.locale") }"#),
    )
    .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let data = response.data.into_json().unwrap();
    assert_eq!(data["token"], serde_json::Value::Null);
    assert_eq!(data["setting"], "en");
    assert_eq!(pool.acquired(), 1);
    assert_eq!(pool.releases(), 1);
    assert_eq!(pool.available(), 2);
}

#[tokio::test]
async fn authenticated_request_sees_its_token() {
    let pool = MemoryPool::with_capacity(1);
    let lifecycle = lifecycle(&pool, SettingsResolver::default());

    let response = execute_with_context(
        &schema(),
        &lifecycle,
        &bearer("Bearer abc123"),
        Request::new(r#"{ token setting(name: "jwt.token") }"#),
    )
    .await;

    let data = response.data.into_json().unwrap();
    assert_eq!(data["token"], "abc123");
    assert_eq!(data["setting"], "abc123");
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn failing_settings_callback_is_a_request_error_without_acquiring() {
    let pool = MemoryPool::with_capacity(1);
    let lifecycle = lifecycle(&pool, SettingsResolver::callback(FailingLookup));

    let response = execute_with_context(
        &schema(),
        &lifecycle,
        &bearer("Bearer abc123"),
        Request::new("{ token }"),
    )
    .await;

    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].message.contains("user record lookup failed"));
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(
        json["errors"][0]["extensions"]["code"],
        "SETTINGS_RESOLUTION_FAILED"
    );
    assert_eq!(pool.acquired(), 0);
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn failing_settings_application_returns_the_connection() {
    let pool = MemoryPool::with_capacity(1);
    pool.0.fail_apply.store(true, Ordering::SeqCst);
    let lifecycle = lifecycle(&pool, SettingsResolver::default());

    let response = execute_with_context(
        &schema(),
        &lifecycle,
        &bearer("Bearer abc123"),
        Request::new("{ token }"),
    )
    .await;

    assert_eq!(response.errors.len(), 1);
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(
        json["errors"][0]["extensions"]["code"],
        "SETTINGS_APPLICATION_FAILED"
    );
    assert_eq!(pool.acquired(), 1);
    assert_eq!(pool.releases(), 1);
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn exhausted_pool_is_a_request_error() {
    let pool = MemoryPool::with_capacity(0);
    let lifecycle = lifecycle(&pool, SettingsResolver::default());

    let response = execute_with_context(
        &schema(),
        &lifecycle,
        &HeaderMap::new().into(),
        Request::new("{ token }"),
    )
    .await;

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(
        json["errors"][0]["extensions"]["code"],
        "CONNECTION_ACQUISITION_FAILED"
    );
    assert_eq!(pool.releases(), 0);
}

#[tokio::test]
async fn resolver_errors_still_release_once() {
    let pool = MemoryPool::with_capacity(1);
    let lifecycle = lifecycle(&pool, SettingsResolver::default());

    let response = execute_with_context(
        &schema(),
        &lifecycle,
        &HeaderMap::new().into(),
        Request::new("{ fail }"),
    )
    .await;

    assert_eq!(response.errors.len(), 1);
    assert_eq!(pool.releases(), 1);
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn panicking_execution_still_releases_once() {
    let pool = MemoryPool::with_capacity(1);
    let lifecycle = Arc::new(lifecycle(&pool, SettingsResolver::default()));

    let task = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move {
            execute_with_context(
                &schema(),
                &*lifecycle,
                &bearer("Bearer abc123"),
                Request::new("{ explode }"),
            )
            .await
        })
    };
    let _ = task.await;

    settle(&pool, 1).await;
    assert_eq!(pool.releases(), 1);
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn concurrent_requests_use_separate_connections() {
    let pool = MemoryPool::with_capacity(8);
    let lifecycle = Arc::new(lifecycle(&pool, SettingsResolver::default()));
    let schema = schema();

    let tasks: Vec<_> = ["Bearer one", "Bearer two", "Bearer three", "Bearer four"]
        .into_iter()
        .map(|header| {
            let lifecycle = lifecycle.clone();
            let schema = schema.clone();
            tokio::spawn(async move {
                execute_with_context(
                    &schema,
                    &*lifecycle,
                    &bearer(header),
                    Request::new("{ token connectionId }"),
                )
                .await
                .data
                .into_json()
                .unwrap()
            })
        })
        .collect();

    let mut ids = Vec::new();
    for (task, expected) in tasks.into_iter().zip(["one", "two", "three", "four"]) {
        let data = task.await.unwrap();
        assert_eq!(data["token"], expected);
        ids.push(data["connectionId"].as_i64().unwrap());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4);
    assert_eq!(pool.releases(), 4);
    assert_eq!(pool.available(), 8);
}
