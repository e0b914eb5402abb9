//! CLI error type.

use thiserror::Error;
use waymark_core::{BackendError, MigrationError};

/// Errors reported by the command-line front end.
#[derive(Debug, Error)]
pub enum CliError {
    /// A version argument is not an integer.
    #[error("invalid database schema version: {0}")]
    InvalidVersion(String),

    /// A version argument is negative.
    #[error("database schema version cannot be negative: {0}")]
    NegativeVersion(i64),

    /// The migration worker failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// The database could not be opened.
    #[error("cannot open database: {0}")]
    Open(#[from] BackendError),

    /// The blocking migration task panicked or was aborted.
    #[error("migration task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
