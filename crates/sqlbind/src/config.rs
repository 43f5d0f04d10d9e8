//! Coordinator settings and `sqlbind.toml` parsing.
//!
//! ```toml
//! [pool]
//! connect_timeout = "5s"
//! slow_statement_threshold = "100ms"
//!
//! [databases.default]
//! host = "127.0.0.1"
//! user = "app"
//! password = "secret"
//! database = "app"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;
use crate::error::{PoolError, PoolResult};

/// Runtime settings for a [`Coordinator`](crate::Coordinator).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on establishing a new connection (default: 5s).
    pub connect_timeout: Duration,
    /// Statements, commits and rollbacks slower than this are logged as slow
    /// (default: 100ms).
    pub slow_statement_threshold: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            slow_statement_threshold: Duration::from_millis(100),
        }
    }
}

/// `[pool]` section as written in TOML.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PoolSection {
    pub connect_timeout: Option<String>,
    pub slow_statement_threshold: Option<String>,
}

/// Top-level `sqlbind.toml` document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SqlbindConfig {
    pub pool: Option<PoolSection>,
    /// Credentials keyed by logical database name.
    #[serde(default)]
    pub databases: BTreeMap<String, Credentials>,
}

impl SqlbindConfig {
    pub fn from_file(path: &Path) -> PoolResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PoolError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> PoolResult<Self> {
        let config: SqlbindConfig =
            toml::from_str(content).map_err(|e| PoolError::Config(e.to_string()))?;
        // Surface bad durations at load time rather than at first use.
        config.pool_config()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> PoolResult<String> {
        toml::to_string_pretty(self).map_err(|e| PoolError::Config(e.to_string()))
    }

    /// Resolve the `[pool]` section over [`PoolConfig::default`].
    pub fn pool_config(&self) -> PoolResult<PoolConfig> {
        let mut config = PoolConfig::default();
        let Some(section) = &self.pool else {
            return Ok(config);
        };
        if let Some(raw) = &section.connect_timeout {
            config.connect_timeout = parse_duration("connect_timeout", raw)?;
        }
        if let Some(raw) = &section.slow_statement_threshold {
            config.slow_statement_threshold = parse_duration("slow_statement_threshold", raw)?;
        }
        Ok(config)
    }
}

/// Parse a `[pool]` duration such as `"500ms"`, `"5s"`, `"1m"` or a bare
/// number of seconds. `field` names the setting in the error.
pub fn parse_duration(field: &str, raw: &str) -> PoolResult<Duration> {
    let value = raw.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits.parse().map_err(|_| {
        PoolError::Config(format!("{field}: expected a number with a unit, got {raw:?}"))
    })?;
    match unit.trim() {
        "ms" => Ok(Duration::from_millis(amount)),
        "" | "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount.saturating_mul(60))),
        other => Err(PoolError::Config(format!(
            "{field}: unknown duration unit {other:?} in {raw:?} (use ms, s or m)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.slow_statement_threshold, Duration::from_millis(100));
    }

    #[test]
    fn parse_duration_units() {
        let parse = |raw| parse_duration("connect_timeout", raw).unwrap();
        assert_eq!(parse("5s"), Duration::from_secs(5));
        assert_eq!(parse("250ms"), Duration::from_millis(250));
        assert_eq!(parse("2m"), Duration::from_secs(120));
        assert_eq!(parse("7"), Duration::from_secs(7));
        assert_eq!(parse(" 3 s "), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_errors_name_field_and_unit() {
        let err = parse_duration("connect_timeout", "2h").unwrap_err().to_string();
        assert!(err.contains("connect_timeout"), "{err}");
        assert!(err.contains("\"h\""), "{err}");

        let err = parse_duration("slow_statement_threshold", "soon")
            .unwrap_err()
            .to_string();
        assert!(err.contains("slow_statement_threshold"), "{err}");
        assert!(matches!(
            parse_duration("connect_timeout", ""),
            Err(PoolError::Config(_))
        ));
    }

    #[test]
    fn parse_full_document() {
        let config = SqlbindConfig::from_toml_str(
            r#"
[pool]
connect_timeout = "2s"
slow_statement_threshold = "50ms"

[databases.default]
host = "db.internal"
user = "app"
password = "secret"
database = "shop"

[databases.reporting]
database = "warehouse"
"#,
        )
        .unwrap();

        let pool = config.pool_config().unwrap();
        assert_eq!(pool.connect_timeout, Duration::from_secs(2));
        assert_eq!(pool.slow_statement_threshold, Duration::from_millis(50));

        assert_eq!(config.databases.len(), 2);
        let reporting = config.databases["reporting"].resolve();
        assert_eq!(reporting.host, crate::credentials::DEFAULT_HOST);
        assert_eq!(reporting.database, "warehouse");
    }

    #[test]
    fn missing_pool_section_uses_defaults() {
        let config = SqlbindConfig::from_toml_str("[databases.default]\nuser = \"app\"\n").unwrap();
        assert_eq!(config.pool_config().unwrap(), PoolConfig::default());
    }

    #[test]
    fn invalid_duration_is_config_error() {
        let err = SqlbindConfig::from_toml_str("[pool]\nconnect_timeout = \"fast\"\n").unwrap_err();
        assert!(matches!(err, PoolError::Config(_)));
        assert!(err.to_string().contains("connect_timeout"));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqlbind.toml");
        std::fs::write(&path, "[databases.default]\nhost = \"10.0.0.5\"\n").unwrap();

        let config = SqlbindConfig::from_file(&path).unwrap();
        assert_eq!(config.databases["default"].host.as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn from_file_missing_is_config_error() {
        let err = SqlbindConfig::from_file(Path::new("/nonexistent/sqlbind.toml")).unwrap_err();
        assert!(matches!(err, PoolError::Config(_)));
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = SqlbindConfig::default();
        config
            .databases
            .insert("default".to_string(), Credentials::new().user("app"));
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("[databases.default]"));
        let parsed = SqlbindConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.databases["default"].user.as_deref(), Some("app"));
    }
}
