//! In-memory pool that counts check-outs, for exercising the lifecycle.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::context::pool::{ConnectionPool, SessionConnection, SessionVariables};

#[derive(Default)]
struct Counters {
    available: AtomicUsize,
    next_id: AtomicUsize,
    releases: AtomicUsize,
    discards: AtomicUsize,
    resets: AtomicUsize,
    fail_apply: AtomicBool,
    fail_reset: AtomicBool,
}

pub struct CountingPool {
    counters: Arc<Counters>,
}

impl CountingPool {
    pub fn new(capacity: usize) -> Arc<Self> {
        let counters = Counters::default();
        counters.available.store(capacity, Ordering::SeqCst);
        Arc::new(Self {
            counters: Arc::new(counters),
        })
    }

    pub fn available(&self) -> usize {
        self.counters.available.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }

    pub fn discards(&self) -> usize {
        self.counters.discards.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.counters.resets.load(Ordering::SeqCst)
    }

    pub fn fail_apply(&self, fail: bool) {
        self.counters.fail_apply.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reset(&self, fail: bool) {
        self.counters.fail_reset.store(fail, Ordering::SeqCst);
    }
}

pub struct FakeConnection {
    pub id: usize,
    pub applied: SessionVariables,
    counters: Arc<Counters>,
}

#[async_trait]
impl ConnectionPool for CountingPool {
    type Connection = FakeConnection;

    async fn acquire(&self) -> Result<FakeConnection> {
        tokio::task::yield_now().await;
        self.counters
            .available
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_err(|_| anyhow!("pool exhausted"))?;
        Ok(FakeConnection {
            id: self.counters.next_id.fetch_add(1, Ordering::SeqCst),
            applied: SessionVariables::new(),
            counters: self.counters.clone(),
        })
    }

    fn release(&self, _connection: FakeConnection) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        self.counters.available.fetch_add(1, Ordering::SeqCst);
    }

    fn discard(&self, _connection: FakeConnection) {
        self.counters.discards.fetch_add(1, Ordering::SeqCst);
        self.counters.available.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionConnection for FakeConnection {
    async fn apply_session(&mut self, variables: &SessionVariables) -> Result<()> {
        if self.counters.fail_apply.load(Ordering::SeqCst) {
            return Err(anyhow!("permission denied to set role"));
        }
        self.applied.extend(variables.iter().cloned());
        Ok(())
    }

    async fn reset_session(&mut self) -> Result<()> {
        if self.counters.fail_reset.load(Ordering::SeqCst) {
            return Err(anyhow!("connection closed"));
        }
        self.counters.resets.fetch_add(1, Ordering::SeqCst);
        self.applied.clear();
        Ok(())
    }
}
