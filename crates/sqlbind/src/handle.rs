//! Per-acquisition handle used by data-access code.

use crate::coordinator::Coordinator;
use crate::error::PoolResult;
use crate::statement::StatementKind;
use crate::value::{Row, Value};
use crate::worker::WorkerId;

/// A worker's view of its binding for one logical name.
///
/// Cheap to create: it only names the binding. Several handles for the same
/// worker and name all address the same connection. Once the binding is
/// closed, every call returns [`PoolError::Unbound`](crate::PoolError::Unbound)
/// until the name is acquired again.
#[derive(Clone, Debug)]
pub struct Handle<'c> {
    coordinator: &'c Coordinator,
    worker: WorkerId,
    name: String,
}

impl<'c> Handle<'c> {
    pub(crate) fn new(coordinator: &'c Coordinator, worker: WorkerId, name: &str) -> Self {
        Self {
            coordinator,
            worker,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Run a statement and return every row. Non-`select` statements mark
    /// the binding dirty.
    pub fn execute(&self, statement: &str, params: &[Value]) -> PoolResult<Vec<Row>> {
        self.coordinator
            .execute(self.worker, &self.name, statement, params)
    }

    /// Run a statement with an explicit read/write classification.
    pub fn execute_as(
        &self,
        kind: StatementKind,
        statement: &str,
        params: &[Value],
    ) -> PoolResult<Vec<Row>> {
        self.coordinator
            .execute_as(self.worker, &self.name, kind, statement, params)
    }

    /// Run a statement and return its first row, if any.
    pub fn query_one(&self, statement: &str, params: &[Value]) -> PoolResult<Option<Row>> {
        Ok(self.execute(statement, params)?.into_iter().next())
    }

    pub fn commit(&self) -> PoolResult<()> {
        self.coordinator.commit(self.worker, &self.name)
    }

    pub fn rollback(&self) -> PoolResult<()> {
        self.coordinator.rollback(self.worker, &self.name)
    }

    pub fn last_insert_id(&self) -> PoolResult<Option<u64>> {
        self.coordinator.last_insert_id(self.worker, &self.name)
    }

    pub fn affected_row_count(&self) -> PoolResult<Option<u64>> {
        self.coordinator.affected_row_count(self.worker, &self.name)
    }

    pub fn is_dirty(&self) -> PoolResult<bool> {
        self.coordinator.is_dirty(self.worker, &self.name)
    }

    /// Release this binding early (rolling back if dirty).
    pub fn close(self) -> PoolResult<bool> {
        self.coordinator.close(self.worker, &self.name)
    }
}
