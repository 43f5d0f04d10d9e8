//! Statement classification and log rendering.
//!
//! A binding turns dirty when it runs anything that may write. The default
//! classification is lexical: a statement is a read only when it starts with
//! the keyword `select` (any case, after leading whitespace). Everything else,
//! including read-only `call`s and `with` queries, is treated as a write.
//! Callers that know better pass an explicit [`StatementKind`].

use crate::value::Value;

/// Whether a statement may leave uncommitted changes behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementKind {
    Read,
    Write,
}

impl StatementKind {
    /// Classify by prefix: `select ...` is a read, anything else a write.
    pub fn classify(statement: &str) -> Self {
        let head = statement.trim_start().as_bytes();
        match head.get(..6) {
            Some(prefix) if prefix.eq_ignore_ascii_case(b"select") => StatementKind::Read,
            _ => StatementKind::Write,
        }
    }

    pub fn is_write(self) -> bool {
        self == StatementKind::Write
    }
}

/// Render a statement with its `?` placeholders replaced by literal values.
///
/// Display only. Falls back to the raw statement when the placeholder count
/// does not match the parameter count.
pub fn render_for_log(statement: &str, params: &[Value]) -> String {
    if params.is_empty() {
        return statement.to_string();
    }
    if statement.matches('?').count() != params.len() {
        return statement.to_string();
    }

    let mut rendered = String::with_capacity(statement.len() + params.len() * 8);
    let mut params = params.iter();
    for ch in statement.chars() {
        match ch {
            '?' => match params.next() {
                Some(value) => rendered.push_str(&value.to_sql_literal()),
                None => rendered.push(ch),
            },
            _ => rendered.push(ch),
        }
    }
    rendered
}
