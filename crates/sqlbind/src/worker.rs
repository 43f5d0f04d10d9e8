//! Worker identity used to partition bindings.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Opaque identity of a request-handling worker.
///
/// Supplied by the surrounding execution context on every call. Two workers
/// with distinct ids never share a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Derive an id from the calling OS thread.
    ///
    /// Stable for the lifetime of the thread; intended for thread-per-request
    /// servers that have no better notion of worker identity.
    pub fn current_thread() -> Self {
        let mut hasher = DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        Self(hasher.finish())
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for WorkerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
