//! Record store accessor: a thin wrapper over one SQLite connection.
//!
//! The connection runs in autocommit mode, so every mutating statement is
//! durable when `execute` returns. Timestamps are stored as RFC 3339 text;
//! reads also accept the `CURRENT_TIMESTAMP` format the engine writes for
//! column defaults.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use core::fmt;
use rusqlite::types::Value;
use rusqlite::Connection;
use std::path::Path;

const SCHEMA_DDL: &str = include_str!("../../migrations/schema.sql");

#[derive(Debug)]
pub enum StoreError {
    /// Zero rows matched a lookup.
    NotFound { table: &'static str, key: String },
    /// More than one row matched a uniqueness-assumed lookup.
    Ambiguous {
        table: &'static str,
        key: String,
        matches: usize,
    },
    /// Insert/update referenced an undeclared field.
    UnknownColumn { table: &'static str, column: String },
    /// A stored value did not decode into the typed field.
    BadValue { column: String, detail: String },
    Sqlite(rusqlite::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { table, key } => write!(f, "no {} row matches {}", table, key),
            StoreError::Ambiguous { table, key, matches } => {
                write!(f, "{} {} rows match {}; expected a unique key", matches, table, key)
            }
            StoreError::UnknownColumn { table, column } => {
                write!(f, "column {} is not declared on {}", column, table)
            }
            StoreError::BadValue { column, detail } => {
                write!(f, "bad value in column {}: {}", column, detail)
            }
            StoreError::Sqlite(e) => write!(f, "sqlite error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        StoreError::Sqlite(value)
    }
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Ok(Store {
            conn: Connection::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Store {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Apply the embedded DDL. Idempotent: every statement is
    /// `CREATE TABLE IF NOT EXISTS`.
    pub fn apply_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA_DDL)?;
        Ok(())
    }

    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, StoreError> {
        Ok(self.conn.execute(sql, rusqlite::params_from_iter(params.iter()))?)
    }

    pub fn fetch_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(names.len());
            for (index, name) in names.iter().enumerate() {
                values.push((name.clone(), row.get::<usize, Value>(index)?));
            }
            out.push(Row { values });
        }
        Ok(out)
    }

    /// Primary key generated by the most recent insert on this connection.
    pub fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }
}

/// One fetched row, with owned values keyed by column name. Typed getters
/// fail with [`StoreError::BadValue`] naming the column.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<(String, Value)>,
}

impl Row {
    fn value(&self, column: &str) -> Result<&Value, StoreError> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
            .ok_or_else(|| StoreError::BadValue {
                column: column.to_string(),
                detail: "column missing from result row".to_string(),
            })
    }

    pub fn integer(&self, column: &str) -> Result<i64, StoreError> {
        match self.value(column)? {
            Value::Integer(v) => Ok(*v),
            other => Err(bad_value(column, other, "an integer")),
        }
    }

    pub fn float(&self, column: &str) -> Result<f64, StoreError> {
        match self.value(column)? {
            Value::Real(v) => Ok(*v),
            Value::Integer(v) => Ok(*v as f64),
            other => Err(bad_value(column, other, "a float")),
        }
    }

    pub fn opt_float(&self, column: &str) -> Result<Option<f64>, StoreError> {
        match self.value(column)? {
            Value::Null => Ok(None),
            _ => self.float(column).map(Some),
        }
    }

    pub fn text(&self, column: &str) -> Result<String, StoreError> {
        match self.value(column)? {
            Value::Text(v) => Ok(v.clone()),
            other => Err(bad_value(column, other, "text")),
        }
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>, StoreError> {
        match self.value(column)? {
            Value::Null => Ok(None),
            _ => self.text(column).map(Some),
        }
    }

    pub fn timestamp(&self, column: &str) -> Result<DateTime<Utc>, StoreError> {
        let text = self.text(column)?;
        parse_timestamp(&text).ok_or_else(|| StoreError::BadValue {
            column: column.to_string(),
            detail: format!("`{}` is not a recognized timestamp", text),
        })
    }

    pub fn opt_timestamp(&self, column: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        match self.value(column)? {
            Value::Null => Ok(None),
            _ => self.timestamp(column).map(Some),
        }
    }
}

fn bad_value(column: &str, found: &Value, wanted: &str) -> StoreError {
    StoreError::BadValue {
        column: column.to_string(),
        detail: format!("expected {}, found {}", wanted, value_type(found)),
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Integer(_) => "INTEGER",
        Value::Real(_) => "REAL",
        Value::Text(_) => "TEXT",
        Value::Blob(_) => "BLOB",
    }
}

/// Render a parameter value for error messages.
pub fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Real(v) => v.to_string(),
        Value::Text(v) => format!("'{}'", v),
        Value::Blob(v) => format!("<{} bytes>", v.len()),
    }
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    // CURRENT_TIMESTAMP default: "2016-08-31 09:27:04"
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
