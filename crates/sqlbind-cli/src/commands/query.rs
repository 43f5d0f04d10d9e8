use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlbind::mysql::MysqlDriver;
use sqlbind::{Coordinator, SqlbindConfig, Value, WorkerId};

pub fn run(config: &str, name: &str, commit: bool, statement: &str, params: &[String]) -> Result<()> {
    let config = SqlbindConfig::from_file(Path::new(config))
        .with_context(|| format!("failed to load {config}"))?;
    if !config.databases.contains_key(name) {
        tracing::warn!(name = %name, "database not configured; using default credentials");
    }

    let coordinator = Coordinator::from_config(&config, Arc::new(MysqlDriver::new()))?;
    let params: Vec<Value> = params.iter().map(|p| parse_param(p)).collect();

    let scope = coordinator.scope(WorkerId::current_thread());
    let db = scope.handle(name, None)?;
    let rows = db.execute(statement, &params)?;

    let output = serde_json::json!({
        "rows": rows,
        "affected_rows": db.affected_row_count()?,
        "last_insert_id": db.last_insert_id()?,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if commit {
        db.commit()?;
    }

    let report = scope.finish();
    tracing::info!(
        closed = report.closed,
        rolled_back = report.rolled_back,
        committed = report.committed,
        discarded = report.discarded,
        "request finished"
    );
    if let Some(err) = report.failures.into_iter().next() {
        return Err(err).context("failed to reconcile connection at request end");
    }

    coordinator.shutdown();
    Ok(())
}

/// Integers and floats bind as numbers, `NULL` as SQL NULL, anything else as text.
fn parse_param(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Value::Int(v);
    }
    if let Ok(v) = raw.parse::<f64>() {
        if v.is_finite() {
            return Value::Float(v);
        }
    }
    Value::Text(raw.to_string())
}
