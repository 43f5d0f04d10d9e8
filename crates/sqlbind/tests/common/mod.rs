//! In-memory transactional driver shared by the integration tests.
//!
//! Understands just enough SQL to observe transaction visibility:
//!
//! - `insert into <table> values (<n>)` (or `(?)` with one parameter)
//!   stages a row in the connection's open transaction
//! - `select * from <table>` returns committed rows plus this connection's
//!   staged rows, one `v` column per row
//! - `select <n>` returns a single row
//! - anything containing `fail` is rejected
//! - anything else succeeds with no rows
//!
//! Every driver call is recorded as an [`Event`], and concurrent use of one
//! connection by two threads is counted as a violation.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use sqlbind::{Connection, Driver, QueryOutcome, ResolvedCredentials, Row, Value};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for test output. Controlled by `RUST_LOG`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Connect(u64),
    Ping(u64),
    Execute(u64, String),
    Commit(u64),
    Rollback(u64),
    Close(u64),
}

#[derive(Default)]
struct Shared {
    committed: Mutex<HashMap<String, Vec<i64>>>,
    events: Mutex<Vec<Event>>,
    next_connection: AtomicU64,
    next_insert_id: AtomicU64,
    fail_connect: AtomicBool,
    fail_rollback: AtomicBool,
    dead: Mutex<HashSet<u64>>,
    busy: Mutex<HashSet<u64>>,
    violations: AtomicU64,
    execute_delay_micros: AtomicU64,
    connect_hosts: Mutex<Vec<String>>,
}

impl Shared {
    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Clone, Default)]
pub struct MemoryDriver {
    shared: Arc<Shared>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared.events.lock().unwrap().clone()
    }

    pub fn clear_events(&self) {
        self.shared.events.lock().unwrap().clear();
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    pub fn connects(&self) -> usize {
        self.count(|e| matches!(e, Event::Connect(_)))
    }

    pub fn commits(&self) -> usize {
        self.count(|e| matches!(e, Event::Commit(_)))
    }

    pub fn rollbacks(&self) -> usize {
        self.count(|e| matches!(e, Event::Rollback(_)))
    }

    pub fn pings(&self) -> usize {
        self.count(|e| matches!(e, Event::Ping(_)))
    }

    /// Rows visible to a connection with no open transaction.
    pub fn committed(&self, table: &str) -> Vec<i64> {
        self.shared
            .committed
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.shared.fail_connect.store(fail, Ordering::Relaxed);
    }

    /// Make every rollback fail, leaving staged rows in place.
    pub fn set_fail_rollback(&self, fail: bool) {
        self.shared.fail_rollback.store(fail, Ordering::Relaxed);
    }

    /// Make the connection with `id` fail every subsequent ping.
    pub fn kill(&self, id: u64) {
        self.shared.dead.lock().unwrap().insert(id);
    }

    pub fn set_execute_delay(&self, delay: Duration) {
        self.shared
            .execute_delay_micros
            .store(delay.as_micros() as u64, Ordering::Relaxed);
    }

    /// Times two threads were inside one connection at once.
    pub fn violations(&self) -> u64 {
        self.shared.violations.load(Ordering::Relaxed)
    }

    pub fn connect_hosts(&self) -> Vec<String> {
        self.shared.connect_hosts.lock().unwrap().clone()
    }
}

impl Driver for MemoryDriver {
    fn connect(
        &self,
        credentials: &ResolvedCredentials,
        _timeout: Duration,
    ) -> Result<Box<dyn Connection>, String> {
        if self.shared.fail_connect.load(Ordering::Relaxed) {
            return Err(format!("Can't connect to MySQL server on '{}'", credentials.host));
        }
        let id = self.shared.next_connection.fetch_add(1, Ordering::Relaxed) + 1;
        self.shared.record(Event::Connect(id));
        self.shared
            .connect_hosts
            .lock()
            .unwrap()
            .push(credentials.host.clone());
        Ok(Box::new(MemoryConnection {
            id,
            shared: Arc::clone(&self.shared),
            staged: Vec::new(),
        }))
    }
}

pub struct MemoryConnection {
    id: u64,
    shared: Arc<Shared>,
    staged: Vec<(String, i64)>,
}

impl std::fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection").field("id", &self.id).finish()
    }
}

impl MemoryConnection {
    fn enter(&self) {
        if !self.shared.busy.lock().unwrap().insert(self.id) {
            self.shared.violations.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn leave(&self) {
        self.shared.busy.lock().unwrap().remove(&self.id);
    }

    fn run(&mut self, statement: &str, params: &[Value]) -> Result<QueryOutcome, String> {
        let lowered = statement.trim().to_ascii_lowercase();
        if lowered.contains("fail") {
            return Err(format!("You have an error in your SQL syntax near '{statement}'"));
        }

        if let Some(rest) = lowered.strip_prefix("insert into ") {
            let (table, tail) = rest.split_once(' ').ok_or("malformed insert")?;
            let inner = tail
                .split_once('(')
                .and_then(|(_, v)| v.split_once(')'))
                .map(|(v, _)| v.trim())
                .ok_or("malformed insert")?;
            let value = if inner == "?" {
                params.first().and_then(Value::as_i64).ok_or("missing parameter")?
            } else {
                inner.parse::<i64>().map_err(|e| e.to_string())?
            };
            self.staged.push((table.to_string(), value));
            let insert_id = self.shared.next_insert_id.fetch_add(1, Ordering::Relaxed) + 1;
            return Ok(QueryOutcome {
                rows: vec![],
                affected_rows: 1,
                last_insert_id: Some(insert_id),
            });
        }

        if let Some(table) = lowered.strip_prefix("select * from ") {
            let table = table.trim();
            let mut values = self
                .shared
                .committed
                .lock()
                .unwrap()
                .get(table)
                .cloned()
                .unwrap_or_default();
            values.extend(self.staged.iter().filter(|(t, _)| t == table).map(|(_, v)| *v));
            let rows: Vec<Row> = values.into_iter().map(|v| Row::new().with("v", v)).collect();
            return Ok(QueryOutcome {
                affected_rows: rows.len() as u64,
                rows,
                last_insert_id: None,
            });
        }

        if let Some(literal) = lowered.strip_prefix("select ") {
            let value = literal.trim().parse::<i64>().unwrap_or(0);
            return Ok(QueryOutcome {
                rows: vec![Row::new().with("v", value)],
                affected_rows: 1,
                last_insert_id: None,
            });
        }

        Ok(QueryOutcome::default())
    }
}

impl Connection for MemoryConnection {
    fn execute(&mut self, statement: &str, params: &[Value]) -> Result<QueryOutcome, String> {
        self.enter();
        self.shared
            .record(Event::Execute(self.id, statement.to_string()));
        let delay = self.shared.execute_delay_micros.load(Ordering::Relaxed);
        if delay > 0 {
            std::thread::sleep(Duration::from_micros(delay));
        }
        let result = self.run(statement, params);
        self.leave();
        result
    }

    fn commit(&mut self) -> Result<(), String> {
        self.shared.record(Event::Commit(self.id));
        let mut committed = self.shared.committed.lock().unwrap();
        for (table, value) in self.staged.drain(..) {
            committed.entry(table).or_default().push(value);
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), String> {
        self.shared.record(Event::Rollback(self.id));
        if self.shared.fail_rollback.load(Ordering::Relaxed) {
            return Err("Lost connection to MySQL server during query".to_string());
        }
        self.staged.clear();
        Ok(())
    }

    fn ping(&mut self) -> bool {
        self.shared.record(Event::Ping(self.id));
        !self.shared.dead.lock().unwrap().contains(&self.id)
    }

    fn describe(&self) -> String {
        format!("memory#{}", self.id)
    }

    fn close(&mut self) {
        self.shared.record(Event::Close(self.id));
    }
}

/// Id of the connection that most recently ran `statement`.
pub fn last_connection_for(events: &[Event], statement: &str) -> Option<u64> {
    events.iter().rev().find_map(|e| match e {
        Event::Execute(id, s) if s == statement => Some(*id),
        _ => None,
    })
}
