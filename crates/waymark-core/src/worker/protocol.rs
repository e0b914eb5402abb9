//! Non-transactional migration steps.
//!
//! A step that cannot run inside a transaction is bracketed by two small
//! transactions on the version table:
//!
//! 1. [`Marked`]: the version row is written with `failed = true`.
//! 2. [`Executed`]: the action ran against the raw connection.
//! 3. Confirmed: the failure flag is cleared (up) or the row deleted (down).
//!
//! If the action fails the row stays marked failed, and every later
//! state-changing operation refuses to run until the version is forced.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use super::Worker;
use crate::action::{DbFunction, Operation, TxFunction};
use crate::backend::{Connection, Transaction};
use crate::error::{BackendError, MigrationError};
use crate::plan::Direction;
use crate::version::{Version, VersionId};

/// Where one step's operation runs.
pub(super) enum Route<'a> {
    /// Inside the step's transaction.
    InTransaction(InTransaction<'a>),
    /// On the raw connection, bracketed by the version-table transactions.
    Outside(Outside),
}

/// Work that runs inside the step's transaction.
pub(super) enum InTransaction<'a> {
    Command(&'a str),
    Function(&'a TxFunction),
}

/// Work that runs on the raw connection.
pub(super) enum Outside {
    Command(String),
    Function(DbFunction),
}

/// Decide where `op` runs.
///
/// Transaction functions always run inside the step's transaction and
/// connection functions never do. Commands run inside it when the driver
/// supports transactional DDL.
pub(super) fn route(op: &Operation, transactional_ddl: bool) -> Route<'_> {
    match op {
        Operation::TxFunction(f) => Route::InTransaction(InTransaction::Function(f)),
        Operation::DbFunction(f) => Route::Outside(Outside::Function(Arc::clone(f))),
        Operation::Command(sql) if transactional_ddl => {
            Route::InTransaction(InTransaction::Command(sql))
        }
        Operation::Command(sql) => Route::Outside(Outside::Command(sql.clone())),
    }
}

impl InTransaction<'_> {
    pub(super) fn run(self, tx: &mut dyn Transaction) -> Result<(), BackendError> {
        match self {
            InTransaction::Command(sql) => tx.execute_batch(sql),
            InTransaction::Function(f) => f(tx),
        }
    }
}

/// The version row has been persisted with `failed = true`.
#[must_use]
#[derive(Debug)]
pub(crate) struct Marked {
    id: VersionId,
    direction: Direction,
}

/// The action ran; the row is still marked failed until confirmed.
#[must_use]
#[derive(Debug)]
pub(crate) struct Executed {
    id: VersionId,
    direction: Direction,
}

impl<C: Connection> Worker<C> {
    /// Run one step through the mark, execute, confirm sequence.
    pub(super) fn run_outside_transaction(
        &mut self,
        id: VersionId,
        direction: Direction,
        work: &Outside,
    ) -> Result<(), MigrationError> {
        let marked = self.mark(id, direction)?;
        let executed = self.execute(marked, work)?;
        self.confirm(executed)
    }

    fn mark(&mut self, id: VersionId, direction: Direction) -> Result<Marked, MigrationError> {
        self.transact(|store, tx| match direction {
            Direction::Up => store.insert(tx, &Version::applied(id, Utc::now()).with_failed(true)),
            Direction::Down => store.set_failed(tx, id, true),
        })?;
        debug!(version = %id, %direction, "marked version failed before non-transactional step");
        Ok(Marked { id, direction })
    }

    fn execute(&mut self, marked: Marked, work: &Outside) -> Result<Executed, MigrationError> {
        let Marked { id, direction } = marked;
        let result = match work {
            Outside::Command(sql) => self.conn.execute_batch(sql),
            Outside::Function(f) => f(&mut self.conn),
        };
        result.map_err(MigrationError::step(id))?;
        debug!(version = %id, %direction, "non-transactional step executed");
        Ok(Executed { id, direction })
    }

    fn confirm(&mut self, executed: Executed) -> Result<(), MigrationError> {
        let Executed { id, direction } = executed;
        self.transact(|store, tx| match direction {
            Direction::Up => store.set_failed(tx, id, false),
            Direction::Down => store.delete(tx, id),
        })?;
        debug!(version = %id, %direction, "non-transactional step confirmed");
        Ok(())
    }
}
