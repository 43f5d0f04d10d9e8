//! MySQL driver built on the `mysql` crate.
//!
//! Sessions are opened with autocommit disabled, so every statement runs
//! inside a transaction that only an explicit `COMMIT` or `ROLLBACK` ends.
//! Statements with parameters use the binary protocol (`?` placeholders);
//! statements without use the text protocol. Text-protocol cells arrive as
//! bytes and are decoded by column type, so a numeric column has the same
//! [`Value`] variant either way.

use std::time::Duration;

use ::mysql::consts::{ColumnFlags, ColumnType};
use ::mysql::prelude::Queryable;
use ::mysql::{Conn, OptsBuilder, Params};

use crate::credentials::ResolvedCredentials;
use crate::driver::{Connection, Driver, QueryOutcome};
use crate::value::{Row, Value};

/// Default MySQL port when the host carries none.
const DEFAULT_PORT: u16 = 3306;

/// Cheapest round trip that exercises the session.
const PING_STATEMENT: &str = "DO 1";

// ── MysqlConnection ─────────────────────────────────────────────────

pub struct MysqlConnection {
    /// `None` once closed.
    conn: Option<Conn>,
    description: String,
}

impl std::fmt::Debug for MysqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MysqlConnection")
            .field("description", &self.description)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl MysqlConnection {
    fn new(conn: Conn) -> Self {
        let (major, minor, patch) = conn.server_version();
        let description = format!("mysql {major}.{minor}.{patch} id={}", conn.connection_id());
        Self {
            conn: Some(conn),
            description,
        }
    }

    fn conn(&mut self) -> Result<&mut Conn, String> {
        self.conn.as_mut().ok_or_else(|| "connection closed".to_string())
    }
}

impl Connection for MysqlConnection {
    fn execute(&mut self, statement: &str, params: &[Value]) -> Result<QueryOutcome, String> {
        let conn = self.conn()?;
        let rows: Vec<::mysql::Row> = if params.is_empty() {
            conn.query(statement).map_err(|e| e.to_string())?
        } else {
            let params = Params::Positional(params.iter().map(to_mysql).collect());
            conn.exec(statement, params).map_err(|e| e.to_string())?
        };

        let affected_rows = if rows.is_empty() {
            conn.affected_rows()
        } else {
            rows.len() as u64
        };
        let last_insert_id = match conn.last_insert_id() {
            0 => None,
            id => Some(id),
        };

        Ok(QueryOutcome {
            rows: rows.iter().map(from_mysql_row).collect(),
            affected_rows,
            last_insert_id,
        })
    }

    fn commit(&mut self) -> Result<(), String> {
        self.conn()?.query_drop("COMMIT").map_err(|e| e.to_string())
    }

    fn rollback(&mut self) -> Result<(), String> {
        self.conn()?.query_drop("ROLLBACK").map_err(|e| e.to_string())
    }

    fn ping(&mut self) -> bool {
        match self.conn.as_mut() {
            Some(conn) => conn.query_drop(PING_STATEMENT).is_ok(),
            None => false,
        }
    }

    fn describe(&self) -> String {
        self.description.clone()
    }

    fn close(&mut self) {
        // Dropping the session sends COM_QUIT.
        self.conn = None;
    }
}

// ── MysqlDriver ─────────────────────────────────────────────────────

/// Opens [`MysqlConnection`]s over TCP.
///
/// The credential host may carry a port (`db.internal:3307`).
#[derive(Clone, Debug, Default)]
pub struct MysqlDriver {
    /// Per-statement read/write timeout; `None` blocks until the server answers.
    pub io_timeout: Option<Duration>,
}

impl MysqlDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn opts(&self, credentials: &ResolvedCredentials, timeout: Duration) -> OptsBuilder {
        let (host, port) = split_host_port(&credentials.host);
        let database = (!credentials.database.is_empty()).then(|| credentials.database.clone());
        OptsBuilder::new()
            .ip_or_hostname(Some(host))
            .tcp_port(port)
            .user(Some(credentials.user.clone()))
            .pass(Some(credentials.password.clone()))
            .db_name(database)
            .tcp_connect_timeout(Some(timeout))
            .read_timeout(self.io_timeout)
            .write_timeout(self.io_timeout)
            .init(vec!["SET autocommit=0", "SET NAMES utf8mb4"])
    }
}

impl Driver for MysqlDriver {
    fn connect(
        &self,
        credentials: &ResolvedCredentials,
        timeout: Duration,
    ) -> Result<Box<dyn Connection>, String> {
        let conn = Conn::new(self.opts(credentials, timeout)).map_err(|e| e.to_string())?;
        let conn = MysqlConnection::new(conn);
        tracing::debug!(
            host = %credentials.host,
            connection = %conn.description,
            "opened mysql session"
        );
        Ok(Box::new(conn))
    }
}

// ── Conversions ─────────────────────────────────────────────────────

fn split_host_port(host: &str) -> (String, u16) {
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') => match port.parse() {
            Ok(port) => (name.to_string(), port),
            Err(_) => (host.to_string(), DEFAULT_PORT),
        },
        _ => (host.to_string(), DEFAULT_PORT),
    }
}

fn to_mysql(value: &Value) -> ::mysql::Value {
    match value {
        Value::Null => ::mysql::Value::NULL,
        Value::Int(v) => ::mysql::Value::Int(*v),
        Value::UInt(v) => ::mysql::Value::UInt(*v),
        Value::Float(v) => ::mysql::Value::Double(*v),
        Value::Text(s) => ::mysql::Value::Bytes(s.as_bytes().to_vec()),
        Value::Bytes(b) => ::mysql::Value::Bytes(b.clone()),
    }
}

fn from_mysql(value: &::mysql::Value) -> Value {
    match value {
        ::mysql::Value::NULL => Value::Null,
        ::mysql::Value::Int(v) => Value::Int(*v),
        ::mysql::Value::UInt(v) => Value::UInt(*v),
        ::mysql::Value::Float(v) => Value::Float(f64::from(*v)),
        ::mysql::Value::Double(v) => Value::Float(*v),
        ::mysql::Value::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => Value::Text(s.to_string()),
            Err(_) => Value::Bytes(b.clone()),
        },
        ::mysql::Value::Date(year, month, day, hour, minute, second, micros) => {
            Value::Text(format!(
                "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{micros:06}"
            ))
        }
        ::mysql::Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if *negative { "-" } else { "" };
            let hours = u32::from(*hours) + days * 24;
            Value::Text(format!("{sign}{hours:02}:{minutes:02}:{seconds:02}.{micros:06}"))
        }
    }
}

/// Convert one cell, parsing text-protocol numbers back to numeric values.
/// DECIMAL stays text to keep its precision.
fn from_mysql_cell(value: &::mysql::Value, column_type: ColumnType, unsigned: bool) -> Value {
    let ::mysql::Value::Bytes(raw) = value else {
        return from_mysql(value);
    };
    let Ok(text) = std::str::from_utf8(raw) else {
        return from_mysql(value);
    };
    let parsed = match column_type {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => {
            if unsigned {
                text.parse().ok().map(Value::UInt)
            } else {
                text.parse().ok().map(Value::Int)
            }
        }
        ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => {
            text.parse().ok().map(Value::Float)
        }
        _ => None,
    };
    parsed.unwrap_or_else(|| from_mysql(value))
}

fn from_mysql_row(row: &::mysql::Row) -> Row {
    let mut out = Row::new();
    for (index, column) in row.columns_ref().iter().enumerate() {
        let unsigned = column.flags().contains(ColumnFlags::UNSIGNED_FLAG);
        let value = row
            .as_ref(index)
            .map(|cell| from_mysql_cell(cell, column.column_type(), unsigned))
            .unwrap_or(Value::Null);
        out.push(column.name_str(), value);
    }
    out
}
