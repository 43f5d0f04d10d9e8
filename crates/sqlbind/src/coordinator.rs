//! Lifecycle coordinator: acquire, execute, reconcile and release.
//!
//! Owns the [`PoolRegistry`] and [`BindingTable`] for one process. Request
//! handlers share a single `Coordinator` (typically behind an `Arc`) and pass
//! their [`WorkerId`] into every call.
//!
//! # Binding states
//!
//! ```text
//!              acquire                    write-classified execute
//!   UNBOUND ───────────▶ BOUND-CLEAN ─────────────────────────▶ BOUND-DIRTY
//!      ▲                    ▲    │                                  │
//!      │                    └────┼──────── commit / rollback ◀──────┘
//!      │                         │                                  │
//!      └──── close / close_all ──┴──────────────────────────────────┘
//! ```
//!
//! `close` rolls back a dirty binding before pooling its connection.
//! `close_all` additionally commits every binding, so no connection re-enters
//! a pool with a transaction (or a stale read snapshot) still open. A dirty
//! binding whose rollback fails is never committed; its connection is closed
//! and dropped instead of pooled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::binding::{Binding, BindingTable};
use crate::config::{PoolConfig, SqlbindConfig};
use crate::credentials::{Credentials, ResolvedCredentials};
use crate::driver::{Connection, Driver};
use crate::error::{PoolError, PoolResult};
use crate::handle::Handle;
use crate::registry::{PoolRegistry, PoolStats};
use crate::scope::RequestScope;
use crate::statement::{StatementKind, render_for_log};
use crate::value::{Row, Value};
use crate::worker::WorkerId;

/// Logical name used when the caller does not name a database.
pub const DEFAULT_NAME: &str = "default";

/// Outcome of reconciling one worker's bindings at request end.
#[derive(Debug, Default)]
pub struct CloseReport {
    /// Bindings released back to their pools.
    pub closed: usize,
    /// Rollbacks issued for dirty bindings.
    pub rolled_back: usize,
    /// Final commits that succeeded.
    pub committed: usize,
    /// Connections closed instead of pooled because their rollback failed.
    pub discarded: usize,
    /// Commit/rollback failures.
    pub failures: Vec<PoolError>,
}

impl CloseReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Process-wide connection pooling and transaction lifecycle manager.
pub struct Coordinator {
    registry: PoolRegistry,
    bindings: BindingTable,
    config: PoolConfig,
    driver: Arc<dyn Driver>,
    /// When true, `acquire` is rejected and released connections are closed.
    shut_down: AtomicBool,
}

impl Coordinator {
    pub fn new(config: PoolConfig, driver: Arc<dyn Driver>) -> Self {
        Self {
            registry: PoolRegistry::new(),
            bindings: BindingTable::new(),
            config,
            driver,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Build a coordinator from a parsed `sqlbind.toml` and register every
    /// configured logical name.
    pub fn from_config(config: &SqlbindConfig, driver: Arc<dyn Driver>) -> PoolResult<Self> {
        let coordinator = Self::new(config.pool_config()?, driver);
        coordinator.register_configured(config);
        Ok(coordinator)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Register (or update) credentials for `name` without binding anything.
    pub fn register(&self, name: &str, credentials: &Credentials) -> ResolvedCredentials {
        self.registry.ensure(name, Some(credentials))
    }

    pub fn register_configured(&self, config: &SqlbindConfig) {
        for (name, credentials) in &config.databases {
            let resolved = self.register(name, credentials);
            tracing::debug!(
                name = %name,
                host = %resolved.host,
                user = %resolved.user,
                database = %resolved.database,
                "registered configured database"
            );
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    // ── Acquire ─────────────────────────────────────────────────────

    /// Bind a connection for `name` to `worker`.
    ///
    /// Idempotent: if the worker already holds a binding for `name` it is
    /// left untouched. Otherwise an idle pooled connection is pinged and
    /// reused (reconnecting if the ping fails), or a new one is opened.
    /// On connection failure no binding is recorded.
    pub fn acquire(
        &self,
        worker: WorkerId,
        name: &str,
        credentials: Option<&Credentials>,
    ) -> PoolResult<Handle<'_>> {
        if self.is_shut_down() {
            return Err(PoolError::ShutDown);
        }

        let resolved = self.registry.ensure(name, credentials);

        if self.bindings.contains(worker, name) {
            tracing::trace!(worker = %worker, name = %name, "binding already held");
            return Ok(Handle::new(self, worker, name));
        }

        let connection = self.checkout(name, &resolved)?;
        if let Err(binding) = self.bindings.insert(worker, Binding::new(name, connection)) {
            // Lost a race against the same worker id; keep the existing binding.
            self.release_connection(name, binding.connection);
        } else {
            tracing::debug!(worker = %worker, name = %name, "bound connection");
        }
        Ok(Handle::new(self, worker, name))
    }

    /// Shorthand for [`acquire`](Self::acquire) on [`DEFAULT_NAME`].
    pub fn acquire_default(&self, worker: WorkerId) -> PoolResult<Handle<'_>> {
        self.acquire(worker, DEFAULT_NAME, None)
    }

    fn checkout(
        &self,
        name: &str,
        credentials: &ResolvedCredentials,
    ) -> PoolResult<Box<dyn Connection>> {
        let Some(mut conn) = self.registry.take(name) else {
            return self.open_connection(name, credentials);
        };

        if conn.ping() {
            self.registry.record_reused(name);
            tracing::debug!(
                name = %name,
                connection = %conn.describe(),
                "reused idle connection from pool"
            );
            return Ok(conn);
        }

        tracing::debug!(
            name = %name,
            connection = %conn.describe(),
            "idle connection failed ping, reconnecting"
        );
        self.discard_connection(name, conn);
        self.open_connection(name, credentials)
    }

    fn open_connection(
        &self,
        name: &str,
        credentials: &ResolvedCredentials,
    ) -> PoolResult<Box<dyn Connection>> {
        tracing::debug!(
            name = %name,
            host = %credentials.host,
            user = %credentials.user,
            database = %credentials.database,
            "connecting"
        );
        let started = Instant::now();
        let conn = self
            .driver
            .connect(credentials, self.config.connect_timeout)
            .map_err(|reason| PoolError::Connect {
                name: name.to_string(),
                host: credentials.host.clone(),
                reason,
            })?;
        self.registry.record_opened(name);
        tracing::debug!(
            name = %name,
            host = %credentials.host,
            user = %credentials.user,
            database = %credentials.database,
            connection = %conn.describe(),
            duration = ?started.elapsed(),
            "connected"
        );
        Ok(conn)
    }

    // ── Statements ──────────────────────────────────────────────────

    /// Run a statement on the worker's binding and return every row.
    ///
    /// Anything not starting with `select` marks the binding dirty. A failed
    /// statement leaves the dirty flag and cursor as they were.
    pub fn execute(
        &self,
        worker: WorkerId,
        name: &str,
        statement: &str,
        params: &[Value],
    ) -> PoolResult<Vec<Row>> {
        self.execute_as(worker, name, StatementKind::classify(statement), statement, params)
    }

    /// Like [`execute`](Self::execute) with a caller-supplied classification.
    pub fn execute_as(
        &self,
        worker: WorkerId,
        name: &str,
        kind: StatementKind,
        statement: &str,
        params: &[Value],
    ) -> PoolResult<Vec<Row>> {
        self.bindings.with_binding(worker, name, |binding| {
            let started = Instant::now();
            let result = binding.connection.execute(statement, params);
            let elapsed = started.elapsed();

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(reason) => {
                    tracing::debug!(
                        name = %name,
                        statement = %render_for_log(statement, params),
                        error = %reason,
                        "statement failed"
                    );
                    return Err(PoolError::Statement {
                        name: name.to_string(),
                        reason,
                    });
                }
            };

            binding.cursor.record(&outcome);
            if kind.is_write() {
                binding.dirty = true;
            }
            self.log_timed("statement", name, elapsed, || render_for_log(statement, params));
            Ok(outcome.rows)
        })
    }

    pub fn commit(&self, worker: WorkerId, name: &str) -> PoolResult<()> {
        self.bindings.with_binding(worker, name, |binding| {
            self.commit_binding(binding)?;
            binding.dirty = false;
            Ok(())
        })
    }

    pub fn rollback(&self, worker: WorkerId, name: &str) -> PoolResult<()> {
        self.bindings.with_binding(worker, name, |binding| {
            self.rollback_binding(binding)?;
            binding.dirty = false;
            Ok(())
        })
    }

    fn commit_binding(&self, binding: &mut Binding) -> PoolResult<()> {
        let started = Instant::now();
        binding
            .connection
            .commit()
            .map_err(|reason| PoolError::Commit {
                name: binding.name.clone(),
                reason,
            })?;
        self.log_timed("commit", &binding.name, started.elapsed(), || {
            binding.connection.describe()
        });
        Ok(())
    }

    fn rollback_binding(&self, binding: &mut Binding) -> PoolResult<()> {
        let started = Instant::now();
        binding
            .connection
            .rollback()
            .map_err(|reason| PoolError::Rollback {
                name: binding.name.clone(),
                reason,
            })?;
        self.log_timed("rollback", &binding.name, started.elapsed(), || {
            binding.connection.describe()
        });
        Ok(())
    }

    fn log_timed(
        &self,
        operation: &'static str,
        name: &str,
        elapsed: Duration,
        detail: impl FnOnce() -> String,
    ) {
        if elapsed > self.config.slow_statement_threshold {
            tracing::warn!(
                name = %name,
                operation = operation,
                detail = %detail(),
                duration = ?elapsed,
                "slow database operation"
            );
        } else {
            tracing::debug!(
                name = %name,
                operation = operation,
                detail = %detail(),
                duration = ?elapsed,
                "database operation"
            );
        }
    }

    // ── Metadata ────────────────────────────────────────────────────

    /// Auto-increment id from the binding's most recent execute.
    pub fn last_insert_id(&self, worker: WorkerId, name: &str) -> PoolResult<Option<u64>> {
        self.bindings
            .with_binding(worker, name, |binding| Ok(binding.cursor.last_insert_id()))
    }

    /// Affected (or returned) row count from the most recent execute.
    pub fn affected_row_count(&self, worker: WorkerId, name: &str) -> PoolResult<Option<u64>> {
        self.bindings
            .with_binding(worker, name, |binding| Ok(binding.cursor.affected_rows()))
    }

    pub fn is_dirty(&self, worker: WorkerId, name: &str) -> PoolResult<bool> {
        self.bindings.with_binding(worker, name, |binding| Ok(binding.dirty))
    }

    pub fn is_bound(&self, worker: WorkerId, name: &str) -> bool {
        self.bindings.contains(worker, name)
    }

    /// Logical names the worker currently holds, sorted.
    pub fn bound_names(&self, worker: WorkerId) -> Vec<String> {
        self.bindings.names(worker)
    }

    /// Bindings held across all workers.
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn pool_stats(&self, name: &str) -> Option<PoolStats> {
        self.registry.stats(name)
    }

    pub fn credentials(&self, name: &str) -> Option<ResolvedCredentials> {
        self.registry.credentials(name)
    }

    /// Registered logical names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.registry.names()
    }

    // ── Release ─────────────────────────────────────────────────────

    /// Release the worker's binding for `name`, rolling back if dirty.
    ///
    /// Returns `Ok(false)` when nothing was bound. A failed rollback is
    /// returned as an error and the connection is closed rather than pooled,
    /// since its uncommitted writes may still be pending.
    pub fn close(&self, worker: WorkerId, name: &str) -> PoolResult<bool> {
        let Some(mut binding) = self.bindings.remove(worker, name) else {
            return Ok(false);
        };

        if binding.dirty {
            if let Err(e) = self.rollback_binding(&mut binding) {
                tracing::warn!(worker = %worker, name = %name, error = %e, "rollback failed on close, discarding connection");
                self.discard_connection(name, binding.connection);
                return Err(e);
            }
        }

        self.release_connection(name, binding.connection);
        tracing::debug!(worker = %worker, name = %name, "closed binding");
        Ok(true)
    }

    /// Reconcile and release every binding the worker holds.
    ///
    /// Dirty bindings are rolled back; every binding is then committed so the
    /// connection re-enters its pool with no open transaction. A binding whose
    /// rollback fails skips the commit and its connection is discarded. A
    /// failed commit still pools the connection. Failures are logged and
    /// collected in the report. Must run once at the end of every request, on
    /// every code path.
    pub fn close_all(&self, worker: WorkerId) -> CloseReport {
        let mut report = CloseReport::default();

        for mut binding in self.bindings.take_all(worker) {
            report.closed += 1;
            if binding.dirty {
                if let Err(e) = self.rollback_binding(&mut binding) {
                    tracing::warn!(worker = %worker, name = %binding.name, error = %e, "rollback failed during close_all, discarding connection");
                    report.failures.push(e);
                    report.discarded += 1;
                    self.discard_connection(&binding.name, binding.connection);
                    continue;
                }
                report.rolled_back += 1;
            }
            match self.commit_binding(&mut binding) {
                Ok(()) => report.committed += 1,
                Err(e) => {
                    tracing::warn!(worker = %worker, name = %binding.name, error = %e, "commit failed during close_all");
                    report.failures.push(e);
                }
            }
            self.release_connection(&binding.name, binding.connection);
        }

        if report.closed > 0 {
            tracing::debug!(
                worker = %worker,
                closed = report.closed,
                rolled_back = report.rolled_back,
                discarded = report.discarded,
                failures = report.failures.len(),
                "released all bindings"
            );
        }
        report
    }

    fn release_connection(&self, name: &str, conn: Box<dyn Connection>) {
        if let Err(conn) = self.registry.give(name, conn) {
            tracing::debug!(name = %name, "pool closed, closing released connection");
            self.discard_connection(name, conn);
        }
    }

    fn discard_connection(&self, name: &str, mut conn: Box<dyn Connection>) {
        tracing::debug!(name = %name, connection = %conn.describe(), "closing connection");
        conn.close();
        self.registry.record_closed(name);
    }

    /// Open a [`RequestScope`] that runs `close_all` for `worker` when dropped.
    pub fn scope(&self, worker: WorkerId) -> RequestScope<'_> {
        RequestScope::new(self, worker)
    }

    // ── Termination ─────────────────────────────────────────────────

    /// Stop handing out connections and close every idle pooled connection.
    ///
    /// Bound connections stay with their workers; they are closed instead of
    /// pooled when those workers call `close`/`close_all`. Returns the number
    /// of idle connections closed.
    pub fn shutdown(&self) -> usize {
        self.shut_down.store(true, Ordering::Release);
        let idle = self.registry.close();
        let closed = idle.len();
        for (name, mut conn) in idle {
            tracing::debug!(name = %name, connection = %conn.describe(), "closing idle connection");
            conn.close();
        }
        tracing::info!(
            closed = closed,
            still_bound = self.bindings.len(),
            "coordinator shut down"
        );
        closed
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
