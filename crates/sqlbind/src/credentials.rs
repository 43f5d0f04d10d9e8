//! Connection credentials per logical database name.
//!
//! Credentials arrive as partial records: every field is optional. The pool
//! registry merges each supplied record into the stored one field by field,
//! so a later `acquire` that only names a database keeps the host and user
//! registered earlier. Unset fields resolve to defaults when a connection is
//! opened.

use serde::{Deserialize, Serialize};

/// Host used when no host was ever supplied for a logical name.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// A partial credential record. `None` fields leave the stored value alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the host.
    pub fn host(self, host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..self
        }
    }

    /// Builder method: set the user.
    pub fn user(self, user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ..self
        }
    }

    /// Builder method: set the password.
    pub fn password(self, password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            ..self
        }
    }

    /// Builder method: set the database (schema) name.
    pub fn database(self, database: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            ..self
        }
    }

    /// Overwrite the fields that `update` supplies, keep the rest.
    pub fn merge(&mut self, update: &Credentials) {
        if let Some(host) = &update.host {
            self.host = Some(host.clone());
        }
        if let Some(user) = &update.user {
            self.user = Some(user.clone());
        }
        if let Some(password) = &update.password {
            self.password = Some(password.clone());
        }
        if let Some(database) = &update.database {
            self.database = Some(database.clone());
        }
    }

    /// Fill unset fields with defaults.
    pub fn resolve(&self) -> ResolvedCredentials {
        ResolvedCredentials {
            host: self.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
            user: self.user.clone().unwrap_or_default(),
            password: self.password.clone().unwrap_or_default(),
            database: self.database.clone().unwrap_or_default(),
        }
    }
}

/// Fully resolved credentials handed to the driver.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

// Keep passwords out of logs.
impl std::fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}
