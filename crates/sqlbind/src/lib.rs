//! Per-worker database connection binding for request handlers.
//!
//! Each request-handling worker gets exclusive use of one connection per
//! logical database name for the duration of a request. Connections come
//! from per-name pools and go back to them at request end, after any
//! uncommitted writes are rolled back and the transaction is closed.
//!
//! - **registry**: idle connection queues and credentials per logical name
//! - **binding**: the (worker, name) → connection table with dirty tracking
//! - **coordinator**: acquire / execute / commit / rollback / close / close_all
//! - **handle**: the per-acquisition API used by data-access code
//! - **scope**: RAII request guard that always runs `close_all`
//! - **driver**: traits the backing-store driver implements
//! - **mysql** (feature `mysql`): a driver built on the `mysql` crate
//!
//! ```no_run
//! use std::sync::Arc;
//! use sqlbind::{Coordinator, Credentials, PoolConfig, Value, WorkerId};
//! # fn driver() -> Arc<dyn sqlbind::Driver> { unimplemented!() }
//!
//! let coordinator = Coordinator::new(PoolConfig::default(), driver());
//! let scope = coordinator.scope(WorkerId::current_thread());
//! let db = scope.handle("default", Some(&Credentials::new().user("app")))?;
//! db.execute("insert into audit (event) values (?)", &[Value::from("login")])?;
//! db.commit()?;
//! // Dropping `scope` reconciles and returns the connection to its pool.
//! # Ok::<(), sqlbind::PoolError>(())
//! ```

pub mod binding;
pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod handle;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod registry;
pub mod scope;
pub mod statement;
pub mod value;
pub mod worker;

pub use config::{PoolConfig, SqlbindConfig};
pub use coordinator::{CloseReport, Coordinator, DEFAULT_NAME};
pub use credentials::{Credentials, ResolvedCredentials};
pub use driver::{Connection, Driver, QueryOutcome};
pub use error::{PoolError, PoolResult};
pub use handle::Handle;
pub use registry::PoolStats;
pub use scope::RequestScope;
pub use statement::StatementKind;
pub use value::{Row, Value};
pub use worker::WorkerId;
