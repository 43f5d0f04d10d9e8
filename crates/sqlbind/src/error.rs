//! Error types for the connection binding core.

use thiserror::Error;

use crate::worker::WorkerId;

/// Result type alias for pool and binding operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors that can occur while acquiring, using or reconciling bindings.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The driver could not open a connection for a logical name.
    #[error("failed to connect to '{name}' at {host}: {reason}")]
    Connect {
        name: String,
        host: String,
        reason: String,
    },

    /// An operation was attempted without a prior `acquire`.
    #[error("no active binding for '{name}' on worker {worker}")]
    Unbound { worker: WorkerId, name: String },

    /// The backing store rejected or failed a statement.
    #[error("statement failed on '{name}': {reason}")]
    Statement { name: String, reason: String },

    #[error("commit failed on '{name}': {reason}")]
    Commit { name: String, reason: String },

    #[error("rollback failed on '{name}': {reason}")]
    Rollback { name: String, reason: String },

    /// The coordinator has been shut down and no longer hands out connections.
    #[error("coordinator is shut down")]
    ShutDown,
}

impl PoolError {
    /// True for contract violations (operation on an unbound binding).
    pub fn is_unbound(&self) -> bool {
        matches!(self, PoolError::Unbound { .. })
    }
}
