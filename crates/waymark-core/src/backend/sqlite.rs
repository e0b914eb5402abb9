//! SQLite backend built on rusqlite.

use std::path::Path;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, ToSql};
use tracing::debug;

use super::{Connection, Executor, Row, Transaction, Value};
use crate::error::BackendError;

/// Backend name declared by SQLite connections.
pub const BACKEND_NAME: &str = "sqlite";

/// A SQLite database connection.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Open (or create) a SQLite database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening sqlite database");
        Ok(Self {
            conn: rusqlite::Connection::open(path)?,
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, BackendError> {
        Ok(Self {
            conn: rusqlite::Connection::open_in_memory()?,
        })
    }

    /// Wrap an existing rusqlite connection.
    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Access the underlying rusqlite connection.
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }

    /// Unwrap into the underlying rusqlite connection.
    pub fn into_inner(self) -> rusqlite::Connection {
        self.conn
    }
}

impl Executor for SqliteConnection {
    fn execute_batch(&mut self, sql: &str) -> Result<(), BackendError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize, BackendError> {
        Ok(self.conn.execute(sql, params_from_iter(params.iter()))?)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, BackendError> {
        query_rows(&self.conn, sql, params)
    }
}

impl Connection for SqliteConnection {
    fn backend_name(&self) -> &str {
        BACKEND_NAME
    }

    fn begin(&mut self) -> Result<Box<dyn Transaction + '_>, BackendError> {
        let tx = self.conn.transaction()?;
        Ok(Box::new(SqliteTransaction { tx }))
    }
}

/// An open SQLite transaction.
///
/// Dropping it without calling commit rolls it back.
#[derive(Debug)]
pub struct SqliteTransaction<'conn> {
    tx: rusqlite::Transaction<'conn>,
}

impl Executor for SqliteTransaction<'_> {
    fn execute_batch(&mut self, sql: &str) -> Result<(), BackendError> {
        self.tx.execute_batch(sql)?;
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize, BackendError> {
        Ok(self.tx.execute(sql, params_from_iter(params.iter()))?)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, BackendError> {
        query_rows(&self.tx, sql, params)
    }
}

impl Transaction for SqliteTransaction<'_> {
    fn commit(self: Box<Self>) -> Result<(), BackendError> {
        let this = *self;
        this.tx.commit()?;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), BackendError> {
        let this = *self;
        this.tx.rollback()?;
        Ok(())
    }
}

fn query_rows(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[Value],
) -> Result<Vec<Row>, BackendError> {
    let mut stmt = conn.prepare(sql)?;
    let columns = stmt.column_count();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns);
        for idx in 0..columns {
            values.push(from_value_ref(row.get_ref(idx)?));
        }
        out.push(Row(values));
    }
    Ok(out)
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => Value::Blob(v.to_vec()),
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;

        Ok(match self {
            Value::Null => ToSqlOutput::Owned(Sql::Null),
            Value::Integer(v) => ToSqlOutput::Owned(Sql::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(Sql::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
            Value::Bool(v) => ToSqlOutput::Owned(Sql::Integer(i64::from(*v))),
            // SQLite has no timestamp type; RFC 3339 text sorts and parses cleanly.
            Value::Timestamp(v) => ToSqlOutput::Owned(Sql::Text(v.to_rfc3339())),
        })
    }
}
