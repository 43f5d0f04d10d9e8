use std::path::Path;

use anyhow::{Context, Result};
use sqlbind::SqlbindConfig;

pub fn run(config: &str) -> Result<()> {
    let parsed = SqlbindConfig::from_file(Path::new(config))
        .with_context(|| format!("failed to load {config}"))?;
    let summary = summarize(&parsed)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    tracing::info!(
        config = %config,
        databases = parsed.databases.len(),
        "config ok"
    );
    Ok(())
}

/// Resolved settings with passwords left out.
fn summarize(config: &SqlbindConfig) -> Result<serde_json::Value> {
    let pool = config.pool_config()?;
    let databases: serde_json::Map<String, serde_json::Value> = config
        .databases
        .iter()
        .map(|(name, credentials)| {
            let resolved = credentials.resolve();
            let entry = serde_json::json!({
                "host": resolved.host,
                "user": resolved.user,
                "database": resolved.database,
                "password_set": !resolved.password.is_empty(),
            });
            (name.clone(), entry)
        })
        .collect();

    Ok(serde_json::json!({
        "pool": {
            "connect_timeout_ms": pool.connect_timeout.as_millis() as u64,
            "slow_statement_threshold_ms": pool.slow_statement_threshold.as_millis() as u64,
        },
        "databases": databases,
    }))
}
