//! Storage backend contract.
//!
//! The worker talks to a database through three small traits:
//!
//! - [`Executor`] runs statements and queries. Both connections and
//!   transactions implement it.
//! - [`Connection`] is a live database handle that declares which backend it
//!   talks to and can open transactions.
//! - [`Transaction`] is an open transaction that is either committed or
//!   rolled back.
//!
//! Migration functions receive these traits as trait objects, so a schema
//! does not depend on the concrete database crate.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnection, SqliteTransaction};

use crate::error::BackendError;
use crate::version::VersionId;
use chrono::{DateTime, FixedOffset, Utc};

/// A parameter or column value exchanged with a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating point.
    Real(f64),
    /// UTF-8 string.
    Text(String),
    /// Binary data.
    Blob(Vec<u8>),
    /// Boolean value.
    Bool(bool),
    /// Timestamp with offset.
    Timestamp(DateTime<FixedOffset>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as bool. Integers are treated as C-style booleans.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Integer(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Try to get as string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Bool(_) => "bool",
            Value::Timestamp(_) => "timestamp",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
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

impl From<VersionId> for Value {
    fn from(v: VersionId) -> Self {
        Value::Integer(v.0)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One row of a query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(pub Vec<Value>);

impl Row {
    /// Get the value in a column.
    pub fn get(&self, column: usize) -> Option<&Value> {
        self.0.get(column)
    }

    /// Get an integer column, failing on any other type.
    pub fn get_i64(&self, column: usize) -> Result<i64, BackendError> {
        let value = self.column(column)?;
        value.as_i64().ok_or_else(|| BackendError::Decode {
            column,
            message: format!("expected integer, found {}", value.type_name()),
        })
    }

    /// Get a boolean column, failing on any other type.
    pub fn get_bool(&self, column: usize) -> Result<bool, BackendError> {
        let value = self.column(column)?;
        value.as_bool().ok_or_else(|| BackendError::Decode {
            column,
            message: format!("expected boolean, found {}", value.type_name()),
        })
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn column(&self, column: usize) -> Result<&Value, BackendError> {
        self.0.get(column).ok_or_else(|| BackendError::Decode {
            column,
            message: format!("row has only {} columns", self.0.len()),
        })
    }
}

/// Runs statements against a database.
pub trait Executor {
    /// Execute one or more statements separated by semicolons, without
    /// parameters.
    fn execute_batch(&mut self, sql: &str) -> Result<(), BackendError>;

    /// Execute a single statement and return the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize, BackendError>;

    /// Run a query and collect every row.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, BackendError>;
}

/// A live database connection.
pub trait Connection: Executor {
    /// Declared backend identity, such as `"sqlite"` or `"postgres"`.
    ///
    /// The worker picks its SQL dialect driver from this name.
    fn backend_name(&self) -> &str;

    /// Begin a transaction.
    fn begin(&mut self) -> Result<Box<dyn Transaction + '_>, BackendError>;
}

/// An open database transaction.
pub trait Transaction: Executor {
    /// Commit the transaction.
    fn commit(self: Box<Self>) -> Result<(), BackendError>;

    /// Roll back the transaction.
    fn rollback(self: Box<Self>) -> Result<(), BackendError>;
}
