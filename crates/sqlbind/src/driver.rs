//! Backing-store driver abstraction.
//!
//! The coordinator never speaks a wire protocol itself. It drives live
//! sessions through [`Connection`] and opens new ones through [`Driver`],
//! both injected so tests can substitute in-memory implementations.

use std::time::Duration;

use crate::credentials::ResolvedCredentials;
use crate::value::{Row, Value};

/// Everything a single statement execution produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOutcome {
    /// The fully fetched result set (empty for statements without one).
    pub rows: Vec<Row>,
    /// Rows changed by a write, or rows returned by a read.
    pub affected_rows: u64,
    /// Auto-increment id generated by the statement, if any.
    pub last_insert_id: Option<u64>,
}

/// A live session to the backing store.
///
/// Implementations run with autocommit disabled: statements accumulate in an
/// open transaction until `commit` or `rollback`.
pub trait Connection: Send + std::fmt::Debug {
    /// Run a statement and fetch its full result set.
    fn execute(&mut self, statement: &str, params: &[Value]) -> Result<QueryOutcome, String>;
    fn commit(&mut self) -> Result<(), String>;
    fn rollback(&mut self) -> Result<(), String>;
    /// Liveness probe. Returns `true` if the session is usable.
    fn ping(&mut self) -> bool;
    /// Short human-readable description (server version, session id) for logs.
    fn describe(&self) -> String;
    /// Close the underlying session.
    fn close(&mut self);
}

/// Factory for new connections.
pub trait Driver: Send + Sync {
    /// Establish a new connection, giving up after `timeout`.
    fn connect(
        &self,
        credentials: &ResolvedCredentials,
        timeout: Duration,
    ) -> Result<Box<dyn Connection>, String>;
}
