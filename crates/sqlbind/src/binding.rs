//! Worker binding table: which connection each worker holds per name.
//!
//! The table is partitioned by [`WorkerId`]. The outer map is locked only
//! long enough to find or create a worker's partition; statements then run
//! under the partition's own lock, which only that worker ever contends for.
//! A slow statement on one worker therefore never blocks another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::driver::{Connection, QueryOutcome};
use crate::error::{PoolError, PoolResult};
use crate::worker::WorkerId;

/// Statement metadata from the most recent execute on a binding.
///
/// Reset whenever a binding is created, so a fresh binding reports `None`
/// until it runs its first statement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    last_insert_id: Option<u64>,
    affected_rows: Option<u64>,
}

impl Cursor {
    pub fn record(&mut self, outcome: &QueryOutcome) {
        self.last_insert_id = outcome.last_insert_id;
        self.affected_rows = Some(outcome.affected_rows);
    }

    pub fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    pub fn affected_rows(&self) -> Option<u64> {
        self.affected_rows
    }
}

/// One worker's exclusive hold on a connection for one logical name.
#[derive(Debug)]
pub struct Binding {
    pub name: String,
    pub connection: Box<dyn Connection>,
    pub cursor: Cursor,
    /// At least one write-classified statement since the last commit/rollback.
    pub dirty: bool,
}

impl Binding {
    pub fn new(name: &str, connection: Box<dyn Connection>) -> Self {
        Self {
            name: name.to_string(),
            connection,
            cursor: Cursor::default(),
            dirty: false,
        }
    }
}

type Partition = Arc<Mutex<HashMap<String, Binding>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// All bindings, partitioned by worker.
#[derive(Debug, Default)]
pub struct BindingTable {
    workers: Mutex<HashMap<WorkerId, Partition>>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, worker: WorkerId) -> Option<Partition> {
        lock(&self.workers).get(&worker).cloned()
    }

    pub fn contains(&self, worker: WorkerId, name: &str) -> bool {
        match self.partition(worker) {
            Some(partition) => {
                let bound = lock(&partition).contains_key(name);
                bound
            }
            None => false,
        }
    }

    /// Record a new binding. Hands the binding back if the worker already
    /// holds one for the same name.
    pub fn insert(&self, worker: WorkerId, binding: Binding) -> Result<(), Binding> {
        let partition = Arc::clone(lock(&self.workers).entry(worker).or_default());
        let mut bindings = lock(&partition);
        if bindings.contains_key(&binding.name) {
            return Err(binding);
        }
        bindings.insert(binding.name.clone(), binding);
        Ok(())
    }

    /// Run `f` against the worker's binding for `name`.
    ///
    /// Fails with [`PoolError::Unbound`] when there is no such binding.
    pub fn with_binding<T>(
        &self,
        worker: WorkerId,
        name: &str,
        f: impl FnOnce(&mut Binding) -> PoolResult<T>,
    ) -> PoolResult<T> {
        let unbound = || PoolError::Unbound {
            worker,
            name: name.to_string(),
        };
        let partition = self.partition(worker).ok_or_else(unbound)?;
        let mut bindings = lock(&partition);
        let binding = bindings.get_mut(name).ok_or_else(unbound)?;
        f(binding)
    }

    pub fn remove(&self, worker: WorkerId, name: &str) -> Option<Binding> {
        let partition = self.partition(worker)?;
        let removed = lock(&partition).remove(name);
        removed
    }

    /// Remove and return every binding the worker holds, sorted by name.
    pub fn take_all(&self, worker: WorkerId) -> Vec<Binding> {
        let Some(partition) = lock(&self.workers).remove(&worker) else {
            return Vec::new();
        };
        let mut bindings: Vec<Binding> = lock(&partition).drain().map(|(_, b)| b).collect();
        bindings.sort_by(|a, b| a.name.cmp(&b.name));
        bindings
    }

    /// Logical names the worker currently holds, sorted.
    pub fn names(&self, worker: WorkerId) -> Vec<String> {
        let Some(partition) = self.partition(worker) else {
            return Vec::new();
        };
        let mut names: Vec<String> = lock(&partition).keys().cloned().collect();
        names.sort();
        names
    }

    /// Total bindings across all workers.
    pub fn len(&self) -> usize {
        let partitions: Vec<Partition> = lock(&self.workers).values().cloned().collect();
        partitions.iter().map(|p| lock(p).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[derive(Debug)]
    struct NullConnection;

    impl Connection for NullConnection {
        fn execute(&mut self, _statement: &str, _params: &[Value]) -> Result<QueryOutcome, String> {
            Ok(QueryOutcome::default())
        }
        fn commit(&mut self) -> Result<(), String> {
            Ok(())
        }
        fn rollback(&mut self) -> Result<(), String> {
            Ok(())
        }
        fn ping(&mut self) -> bool {
            true
        }
        fn describe(&self) -> String {
            "null".to_string()
        }
        fn close(&mut self) {}
    }

    fn binding(name: &str) -> Binding {
        Binding::new(name, Box::new(NullConnection))
    }

    const A: WorkerId = WorkerId::new(1);
    const B: WorkerId = WorkerId::new(2);

    #[test]
    fn new_binding_is_clean_with_empty_cursor() {
        let b = binding("default");
        assert!(!b.dirty);
        assert_eq!(b.cursor.last_insert_id(), None);
        assert_eq!(b.cursor.affected_rows(), None);
    }

    #[test]
    fn cursor_records_outcome() {
        let mut cursor = Cursor::default();
        cursor.record(&QueryOutcome {
            rows: vec![],
            affected_rows: 3,
            last_insert_id: Some(42),
        });
        assert_eq!(cursor.affected_rows(), Some(3));
        assert_eq!(cursor.last_insert_id(), Some(42));
    }

    #[test]
    fn insert_rejects_duplicate_name_per_worker() {
        let table = BindingTable::new();
        table.insert(A, binding("default")).unwrap();
        let rejected = table.insert(A, binding("default"));
        assert!(rejected.is_err());
        // Another worker may bind the same name.
        table.insert(B, binding("default")).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn with_binding_unbound_errors() {
        let table = BindingTable::new();
        let err = table.with_binding(A, "default", |_| Ok(())).unwrap_err();
        assert!(err.is_unbound());

        table.insert(A, binding("other")).unwrap();
        let err = table.with_binding(A, "default", |_| Ok(())).unwrap_err();
        assert!(err.is_unbound());
    }

    #[test]
    fn with_binding_mutates_in_place() {
        let table = BindingTable::new();
        table.insert(A, binding("default")).unwrap();
        table
            .with_binding(A, "default", |b| {
                b.dirty = true;
                Ok(())
            })
            .unwrap();
        let dirty = table.with_binding(A, "default", |b| Ok(b.dirty)).unwrap();
        assert!(dirty);
    }

    #[test]
    fn partitions_are_isolated() {
        let table = BindingTable::new();
        table.insert(A, binding("x")).unwrap();
        assert!(table.contains(A, "x"));
        assert!(!table.contains(B, "x"));
        assert!(table.names(B).is_empty());
    }

    #[test]
    fn take_all_empties_worker_only() {
        let table = BindingTable::new();
        table.insert(A, binding("b")).unwrap();
        table.insert(A, binding("a")).unwrap();
        table.insert(B, binding("a")).unwrap();

        let taken = table.take_all(A);
        let names: Vec<_> = taken.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(table.names(A).is_empty());
        assert_eq!(table.names(B), vec!["a".to_string()]);
        assert!(table.take_all(A).is_empty());
    }

    #[test]
    fn remove_single_binding() {
        let table = BindingTable::new();
        table.insert(A, binding("a")).unwrap();
        table.insert(A, binding("b")).unwrap();
        assert!(table.remove(A, "a").is_some());
        assert!(table.remove(A, "a").is_none());
        assert_eq!(table.names(A), vec!["b".to_string()]);
    }
}
