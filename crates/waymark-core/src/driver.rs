//! Dialect drivers for the version table.
//!
//! A driver knows how one database family stores the version table and
//! whether it can run DDL inside a transaction. The worker picks a driver once,
//! from the connection's declared backend name.

use tracing::debug;

use crate::backend::{Connection, Row, Transaction, Value};
use crate::error::{BackendError, MigrationError};
use crate::version::{decode_applied_at, Version, VersionId};

/// Database vendor specific operations on the version table.
///
/// Only the table definition and placeholder syntax differ between the
/// shipped dialects. The remaining statements have default implementations.
pub trait Driver: Send + Sync + std::fmt::Debug {
    /// Short dialect name, for logging.
    fn name(&self) -> &'static str;

    /// Backend names this driver handles.
    fn backend_names(&self) -> &'static [&'static str];

    /// Whether DDL statements can run inside a transaction.
    fn supports_transactional_ddl(&self) -> bool;

    /// `create table if not exists` statement for the version table.
    fn create_table_sql(&self, table: &str) -> String;

    /// Bind parameter marker for the `n`th parameter, starting at 1.
    fn placeholder(&self, _n: usize) -> String {
        "?".to_string()
    }

    /// Create the version table if it does not exist.
    fn create_versions_table(
        &self,
        conn: &mut dyn Connection,
        table: &str,
    ) -> Result<(), BackendError> {
        conn.execute_batch(&self.create_table_sql(table))
    }

    /// Insert a version row.
    fn insert_version(
        &self,
        tx: &mut dyn Transaction,
        table: &str,
        version: &Version,
    ) -> Result<(), BackendError> {
        let sql = format!(
            "insert into {table}(id,applied_at,failed,locked) values({},{},{},{});",
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3),
            self.placeholder(4),
        );
        tx.execute(
            &sql,
            &[
                Value::from(version.id),
                Value::from(version.applied_at),
                Value::from(version.failed),
                Value::from(version.locked),
            ],
        )?;
        Ok(())
    }

    /// Delete a version row.
    fn delete_version(
        &self,
        tx: &mut dyn Transaction,
        table: &str,
        id: VersionId,
    ) -> Result<(), BackendError> {
        let sql = format!("delete from {table} where id = {};", self.placeholder(1));
        tx.execute(&sql, &[Value::from(id)])?;
        Ok(())
    }

    /// Every version row, in ascending id order.
    fn list_versions(
        &self,
        tx: &mut dyn Transaction,
        table: &str,
    ) -> Result<Vec<Version>, BackendError> {
        let sql = format!("select id,applied_at,failed,locked from {table} order by id");
        tx.query(&sql, &[])?.iter().map(decode_version).collect()
    }

    /// Set or clear the failed flag.
    fn set_version_failed(
        &self,
        tx: &mut dyn Transaction,
        table: &str,
        id: VersionId,
        failed: bool,
    ) -> Result<(), BackendError> {
        set_flag(self, tx, table, "failed", id, failed)
    }

    /// Set or clear the locked flag.
    fn set_version_locked(
        &self,
        tx: &mut dyn Transaction,
        table: &str,
        id: VersionId,
        locked: bool,
    ) -> Result<(), BackendError> {
        set_flag(self, tx, table, "locked", id, locked)
    }
}

fn set_flag<D: Driver + ?Sized>(
    driver: &D,
    tx: &mut dyn Transaction,
    table: &str,
    column: &str,
    id: VersionId,
    value: bool,
) -> Result<(), BackendError> {
    let sql = format!(
        "update {table} set {column} = {} where id = {}",
        driver.placeholder(1),
        driver.placeholder(2)
    );
    tx.execute(&sql, &[Value::from(value), Value::from(id)])?;
    Ok(())
}

fn decode_version(row: &Row) -> Result<Version, BackendError> {
    let id = VersionId(row.get_i64(0)?);
    let applied_at = decode_applied_at(row.get(1).unwrap_or(&Value::Null));
    Ok(Version {
        applied_at: Some(applied_at),
        failed: row.get_bool(2)?,
        locked: row.get_bool(3)?,
        ..Version::unapplied(id)
    })
}

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Driver for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn backend_names(&self) -> &'static [&'static str] {
        &["postgres", "postgresql", "pq"]
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn create_table_sql(&self, table: &str) -> String {
        format!(
            "create table if not exists {table}\
             (id bigint primary key\
             ,applied_at timestamptz not null\
             ,failed boolean not null default 'false'\
             ,locked boolean not null default 'false'\
             );"
        )
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${n}")
    }
}

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Driver for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn backend_names(&self) -> &'static [&'static str] {
        &["sqlite", "sqlite3"]
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn create_table_sql(&self, table: &str) -> String {
        format!(
            "create table if not exists {table}\
             (id integer primary key\
             ,applied_at text not null\
             ,failed integer not null\
             ,locked integer not null\
             );"
        )
    }
}

/// MySQL dialect. MySQL commits implicitly around DDL, so every command
/// migration runs through the non-transactional protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Driver for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn backend_names(&self) -> &'static [&'static str] {
        &["mysql"]
    }

    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    fn create_table_sql(&self, table: &str) -> String {
        format!(
            "create table if not exists {table}\
             (id integer primary key\
             ,applied_at datetime not null\
             ,failed integer not null\
             ,locked integer not null\
             );"
        )
    }
}

/// Select the driver for a connection's declared backend name.
pub fn find_driver(backend_name: &str) -> Result<Box<dyn Driver>, MigrationError> {
    let drivers: [Box<dyn Driver>; 3] = [Box::new(Postgres), Box::new(Sqlite), Box::new(MySql)];
    let driver = drivers
        .into_iter()
        .find(|d| d.backend_names().contains(&backend_name))
        .ok_or_else(|| MigrationError::NoDriver(backend_name.to_string()))?;
    debug!(backend = backend_name, driver = driver.name(), "selected migration driver");
    Ok(driver)
}
