//! Waymark Core - schema version compiler and migration worker.
//!
//! A [`Schema`] collects one [`Definition`] per database schema version. It
//! compiles them into ordered, replay-free [`MigrationPlan`]s, and a
//! [`Worker`] drives a database through those plans one version per
//! transaction.
//!
//! ```no_run
//! use waymark_core::{Action, CancellationToken, Schema, SqliteConnection, Worker, WorkerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut schema = Schema::new();
//! schema
//!     .define(1)
//!     .up("create table city(id integer primary key, name text);")
//!     .down("drop table city;");
//! schema
//!     .define(2)
//!     .up_action(Action::tx_fn(|tx| {
//!         tx.execute_batch("insert into city(name) values('Kyoto');")
//!     }))
//!     .down("delete from city;");
//!
//! let conn = SqliteConnection::open("cities.db")?;
//! let mut worker = Worker::new(conn, &mut schema, WorkerConfig::default())?;
//! worker.up(&CancellationToken::new())?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod backend;
pub mod cancel;
pub mod config;
pub mod definition;
pub mod driver;
pub mod error;
pub mod plan;
pub mod schema;
pub mod summary;
pub mod version;
pub mod worker;

pub use action::{Action, DbFunction, Operation, TxFunction};
pub use backend::{Connection, Executor, Row, Transaction, Value};
pub use cancel::CancellationToken;
pub use config::{WorkerConfig, DEFAULT_MIGRATIONS_TABLE};
pub use definition::Definition;
pub use driver::{find_driver, Driver, MySql, Postgres, Sqlite};
pub use error::{BackendError, MigrationError, SchemaError, SchemaErrors};
pub use plan::{compile, Compilation, Direction, MigrationPlan};
pub use schema::Schema;
pub use summary::VersionSummary;
pub use version::{decode_applied_at, Version, VersionId, VersionStatus};
pub use worker::{ProgressFn, Worker};

#[cfg(feature = "sqlite")]
pub use backend::{SqliteConnection, SqliteTransaction};
