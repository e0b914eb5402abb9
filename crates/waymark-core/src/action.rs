//! Migration actions.
//!
//! An [`Action`] is what a schema author writes for one direction of one
//! version. After compilation every action becomes an [`Operation`], which
//! cannot refer to another version.

use std::fmt;
use std::sync::Arc;

use crate::backend::{Connection, Transaction};
use crate::error::BackendError;
use crate::version::VersionId;

/// A migration function that runs on a raw connection, outside any
/// transaction.
pub type DbFunction = Arc<dyn Fn(&mut dyn Connection) -> Result<(), BackendError> + Send + Sync>;

/// A migration function that runs inside the step's transaction.
pub type TxFunction =
    Arc<dyn Fn(&mut dyn Transaction) -> Result<(), BackendError> + Send + Sync>;

/// The action performed by an up or down migration.
#[derive(Clone)]
pub enum Action {
    /// Execute SQL/DDL text. The most common action.
    Command(String),
    /// Run a function against the raw connection.
    ///
    /// The migration is performed outside of a transaction, so if it fails the
    /// database needs manual repair before any more migrations can proceed.
    /// Prefer [`Action::TxFunction`] where possible.
    DbFunction(DbFunction),
    /// Run a function inside a transaction.
    ///
    /// If it fails the transaction rolls back to the state before the step.
    TxFunction(TxFunction),
    /// Replay the up migration of an earlier version.
    ///
    /// Useful for restoring views, functions and stored procedures in a down
    /// migration without repeating their definitions.
    Replay(VersionId),
}

impl Action {
    /// Execute the SQL/DDL command.
    pub fn command(sql: impl Into<String>) -> Self {
        Action::Command(sql.into())
    }

    /// Run `f` against the raw connection, outside of a transaction.
    pub fn db_fn<F>(f: F) -> Self
    where
        F: Fn(&mut dyn Connection) -> Result<(), BackendError> + Send + Sync + 'static,
    {
        Action::DbFunction(Arc::new(f))
    }

    /// Run `f` inside the step's transaction.
    pub fn tx_fn<F>(f: F) -> Self
    where
        F: Fn(&mut dyn Transaction) -> Result<(), BackendError> + Send + Sync + 'static,
    {
        Action::TxFunction(Arc::new(f))
    }

    /// Replay the up migration of version `id`.
    pub fn replay(id: impl Into<VersionId>) -> Self {
        Action::Replay(id.into())
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Command(sql) => f.debug_tuple("Command").field(sql).finish(),
            Action::DbFunction(_) => f.write_str("DbFunction(..)"),
            Action::TxFunction(_) => f.write_str("TxFunction(..)"),
            Action::Replay(id) => f.debug_tuple("Replay").field(id).finish(),
        }
    }
}

/// A resolved, executable migration action.
#[derive(Clone)]
pub enum Operation {
    /// Execute SQL/DDL text.
    Command(String),
    /// Run a function against the raw connection.
    DbFunction(DbFunction),
    /// Run a function inside a transaction.
    TxFunction(TxFunction),
}

impl Operation {
    /// Text shown for this operation when listing versions.
    pub fn render(&self) -> String {
        match self {
            Operation::Command(sql) => sql.clone(),
            Operation::DbFunction(_) => "(DbFunction)".to_string(),
            Operation::TxFunction(_) => "(TxFunction)".to_string(),
        }
    }

    /// Check if the operation carries its own transaction handling.
    pub fn is_tx_function(&self) -> bool {
        matches!(self, Operation::TxFunction(_))
    }

    /// SQL text, if this is a command.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Operation::Command(sql) => Some(sql),
            _ => None,
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Command(sql) => f.debug_tuple("Command").field(sql).finish(),
            Operation::DbFunction(_) => f.write_str("DbFunction(..)"),
            Operation::TxFunction(_) => f.write_str("TxFunction(..)"),
        }
    }
}

impl PartialEq for Operation {
    /// Commands compare by text; functions compare by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Operation::Command(a), Operation::Command(b)) => a == b,
            (Operation::DbFunction(a), Operation::DbFunction(b)) => Arc::ptr_eq(a, b),
            (Operation::TxFunction(a), Operation::TxFunction(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
