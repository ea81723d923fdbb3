//! Typed SQL values and rows.
//!
//! A [`Row`] is an ordered list of `(column, value)` pairs. It is the only
//! shape the store reads and writes; entity types convert to and from it at
//! the repository boundary.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// A single SQLite storage-class value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the storage class, used in mapping errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

/// Timestamps are stored as fixed-width RFC 3339 text so they sort correctly.
impl From<chrono::DateTime<chrono::Utc>> for Value {
    fn from(v: chrono::DateTime<chrono::Utc>) -> Self {
        Value::Text(v.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Errors converting a [`Row`] into a typed record.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("column '{0}' is missing")]
    MissingColumn(String),

    #[error("column '{column}' expected {expected}, found {found}")]
    UnexpectedType {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("column '{column}' holds an invalid value: {reason}")]
    InvalidValue { column: String, reason: String },
}

impl MappingError {
    pub fn invalid(column: &str, reason: impl fmt::Display) -> Self {
        MappingError::InvalidValue {
            column: column.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// An ordered set of column values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Builder form of [`Row::set`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Sets a column, replacing any previous value for it.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter().position(|c| *c == column) {
            Some(idx) => self.values[idx] = value,
            None => {
                self.columns.push(column);
                self.values.push(value);
            }
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn require(&self, column: &str) -> Result<&Value, MappingError> {
        self.get(column)
            .ok_or_else(|| MappingError::MissingColumn(column.to_string()))
    }

    pub fn i64(&self, column: &str) -> Result<i64, MappingError> {
        match self.require(column)? {
            Value::Integer(v) => Ok(*v),
            other => Err(unexpected(column, "integer", other)),
        }
    }

    pub fn opt_i64(&self, column: &str) -> Result<Option<i64>, MappingError> {
        match self.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Integer(v)) => Ok(Some(*v)),
            Some(other) => Err(unexpected(column, "integer", other)),
        }
    }

    pub fn text(&self, column: &str) -> Result<String, MappingError> {
        match self.require(column)? {
            Value::Text(v) => Ok(v.clone()),
            other => Err(unexpected(column, "text", other)),
        }
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>, MappingError> {
        match self.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(v)) => Ok(Some(v.clone())),
            Some(other) => Err(unexpected(column, "text", other)),
        }
    }

    /// Reads a TEXT column holding JSON.
    pub fn json<T: DeserializeOwned>(&self, column: &str) -> Result<T, MappingError> {
        let raw = self.text(column)?;
        serde_json::from_str(&raw).map_err(|e| MappingError::invalid(column, e))
    }

    /// Reads a TEXT column holding an RFC 3339 timestamp.
    pub fn timestamp(&self, column: &str) -> Result<chrono::DateTime<chrono::Utc>, MappingError> {
        let raw = self.text(column)?;
        parse_timestamp(column, &raw)
    }

    pub fn opt_timestamp(
        &self,
        column: &str,
    ) -> Result<Option<chrono::DateTime<chrono::Utc>>, MappingError> {
        match self.opt_text(column)? {
            Some(raw) => parse_timestamp(column, &raw).map(Some),
            None => Ok(None),
        }
    }
}

/// Serializes a value into a JSON TEXT column value.
pub fn json_text<T: Serialize>(value: &T) -> Value {
    Value::Text(serde_json::to_string(value).unwrap_or_else(|_| "null".to_string()))
}

fn parse_timestamp(
    column: &str,
    raw: &str,
) -> Result<chrono::DateTime<chrono::Utc>, MappingError> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| MappingError::invalid(column, e))
}

fn unexpected(column: &str, expected: &'static str, found: &Value) -> MappingError {
    MappingError::UnexpectedType {
        column: column.to_string(),
        expected,
        found: found.kind(),
    }
}
