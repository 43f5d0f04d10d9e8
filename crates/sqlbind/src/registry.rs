//! Pool registry of idle connections and credentials per logical name.
//!
//! Each logical name owns an unbounded FIFO queue of idle connections and the
//! credential record used to open new ones. Every take/give runs under one
//! registry lock, so an idle connection is handed to at most one caller.
//!
//! ```text
//! acquire(name)
//!   → ensure(name, creds)      register pool, merge credentials
//!   → take(name)
//!     → Some(conn)             caller pings, then record_reused or reconnect
//!     → None                   caller opens a fresh connection
//! close / close_all
//!   → give(name, conn)         back of the queue; handed back once closed
//! shutdown
//!   → close()                  drain every queue, reject later gives
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::credentials::{Credentials, ResolvedCredentials};
use crate::driver::Connection;

/// Per-name pool statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections sitting idle in the pool.
    pub idle: usize,
    /// Live connections belonging to this name (idle + bound).
    pub open: usize,
    /// Most connections open at once.
    pub peak_open: usize,
    /// Connections opened over the pool's lifetime, reconnects included.
    pub created: u64,
    /// Times an idle connection was handed out instead of opening a new one.
    pub reused: u64,
}

impl PoolStats {
    /// Connections currently bound to workers.
    pub fn in_use(&self) -> usize {
        self.open.saturating_sub(self.idle)
    }
}

#[derive(Debug, Default)]
struct NamedPool {
    idle: VecDeque<Box<dyn Connection>>,
    credentials: Credentials,
    open: usize,
    peak_open: usize,
    created: u64,
    reused: u64,
}

#[derive(Debug, Default)]
struct Pools {
    named: HashMap<String, NamedPool>,
    /// Set by [`PoolRegistry::close`]; no connection is queued afterwards.
    closed: bool,
}

/// Process-wide set of named pools.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: Mutex<Pools>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // The registry never panics while holding the lock, so a poisoned lock
    // still guards consistent state.
    fn pools(&self) -> MutexGuard<'_, Pools> {
        self.pools.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `name` if needed, merge `update` into its credentials and
    /// return the resolved credentials.
    pub fn ensure(&self, name: &str, update: Option<&Credentials>) -> ResolvedCredentials {
        let mut pools = self.pools();
        let pool = pools.named.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(name = %name, "registered connection pool");
            NamedPool::default()
        });
        if let Some(update) = update {
            pool.credentials.merge(update);
        }
        pool.credentials.resolve()
    }

    /// Resolved credentials for `name`, if it was ever registered.
    pub fn credentials(&self, name: &str) -> Option<ResolvedCredentials> {
        self.pools().named.get(name).map(|pool| pool.credentials.resolve())
    }

    /// Take the oldest idle connection, or `None` if the pool is empty.
    pub fn take(&self, name: &str) -> Option<Box<dyn Connection>> {
        self.pools().named.get_mut(name)?.idle.pop_front()
    }

    /// Return a connection to the back of the queue.
    ///
    /// After [`close`](Self::close) the connection is handed back so the
    /// caller can close it.
    pub fn give(&self, name: &str, conn: Box<dyn Connection>) -> Result<(), Box<dyn Connection>> {
        let mut pools = self.pools();
        if pools.closed {
            return Err(conn);
        }
        let pool = pools.named.entry(name.to_string()).or_default();
        pool.idle.push_back(conn);
        tracing::debug!(
            name = %name,
            idle_count = pool.idle.len(),
            "returned connection to pool"
        );
        Ok(())
    }

    /// Account for an idle connection that passed its health check and was
    /// handed out again.
    pub fn record_reused(&self, name: &str) {
        if let Some(pool) = self.pools().named.get_mut(name) {
            pool.reused += 1;
        }
    }

    /// Account for a connection opened under `name`.
    pub fn record_opened(&self, name: &str) {
        let mut pools = self.pools();
        let pool = pools.named.entry(name.to_string()).or_default();
        pool.open += 1;
        pool.peak_open = pool.peak_open.max(pool.open);
        pool.created += 1;
    }

    /// Account for a connection under `name` that was closed and dropped.
    pub fn record_closed(&self, name: &str) {
        if let Some(pool) = self.pools().named.get_mut(name) {
            pool.open = pool.open.saturating_sub(1);
        }
    }

    pub fn stats(&self, name: &str) -> Option<PoolStats> {
        self.pools().named.get(name).map(|pool| PoolStats {
            idle: pool.idle.len(),
            open: pool.open,
            peak_open: pool.peak_open,
            created: pool.created,
            reused: pool.reused,
        })
    }

    /// Registered logical names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools().named.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop accepting connections and remove every idle one from every
    /// pool. Credentials and statistics stay.
    pub fn close(&self) -> Vec<(String, Box<dyn Connection>)> {
        let mut pools = self.pools();
        pools.closed = true;
        let mut drained = Vec::new();
        for (name, pool) in pools.named.iter_mut() {
            let count = pool.idle.len();
            pool.open = pool.open.saturating_sub(count);
            drained.extend(pool.idle.drain(..).map(|conn| (name.clone(), conn)));
        }
        drained
    }
}
