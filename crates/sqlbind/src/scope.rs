//! Request lifecycle guard.
//!
//! A [`RequestScope`] covers one request on one worker. Handles are acquired
//! through it, and when it goes out of scope (normal return, `?` early exit,
//! or a panic unwinding through the handler) it runs
//! [`Coordinator::close_all`] exactly once.

use crate::coordinator::{CloseReport, Coordinator, DEFAULT_NAME};
use crate::credentials::Credentials;
use crate::error::PoolResult;
use crate::handle::Handle;
use crate::worker::WorkerId;

#[derive(Debug)]
pub struct RequestScope<'c> {
    coordinator: &'c Coordinator,
    worker: WorkerId,
    finished: bool,
}

impl<'c> RequestScope<'c> {
    pub(crate) fn new(coordinator: &'c Coordinator, worker: WorkerId) -> Self {
        Self {
            coordinator,
            worker,
            finished: false,
        }
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Acquire (or re-use) the worker's binding for `name`.
    pub fn handle(&self, name: &str, credentials: Option<&Credentials>) -> PoolResult<Handle<'_>> {
        self.coordinator.acquire(self.worker, name, credentials)
    }

    /// Acquire the binding for [`DEFAULT_NAME`].
    pub fn default_handle(&self) -> PoolResult<Handle<'_>> {
        self.handle(DEFAULT_NAME, None)
    }

    /// Reconcile and release all bindings now and report the outcome.
    pub fn finish(mut self) -> CloseReport {
        self.finished = true;
        self.coordinator.close_all(self.worker)
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let report = self.coordinator.close_all(self.worker);
        if !report.is_clean() {
            tracing::warn!(
                worker = %self.worker,
                failures = report.failures.len(),
                "request ended with reconciliation failures"
            );
        }
    }
}
