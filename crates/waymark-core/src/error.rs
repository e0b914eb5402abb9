//! Error types for schema definition and migration execution.

use crate::version::VersionId;
use thiserror::Error;

/// A single problem found in a migration schema definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{version}: {description}")]
pub struct SchemaError {
    /// The version the problem belongs to.
    pub version: VersionId,
    /// What is wrong with it.
    pub description: String,
}

impl SchemaError {
    /// Create a new schema error.
    pub fn new(version: VersionId, description: impl Into<String>) -> Self {
        Self {
            version,
            description: description.into(),
        }
    }
}

/// Every problem found in a migration schema, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaErrors(pub Vec<SchemaError>);

impl SchemaErrors {
    /// Check if no problems were found.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of problems found.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the individual problems.
    pub fn iter(&self) -> std::slice::Iter<'_, SchemaError> {
        self.0.iter()
    }
}

impl std::fmt::Display for SchemaErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lines: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", lines.join("\n").trim())
    }
}

impl std::error::Error for SchemaErrors {}

impl From<Vec<SchemaError>> for SchemaErrors {
    fn from(errors: Vec<SchemaError>) -> Self {
        Self(errors)
    }
}

impl<'a> IntoIterator for &'a SchemaErrors {
    type Item = &'a SchemaError;
    type IntoIter = std::slice::Iter<'a, SchemaError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// SQLite reported an error.
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A column could not be decoded into the expected type.
    #[error("cannot decode column {column}: {message}")]
    Decode {
        /// Zero-based column index.
        column: usize,
        /// What was found instead.
        message: String,
    },

    /// Free-form failure, typically raised by a migration function.
    #[error("{0}")]
    Message(String),
}

impl BackendError {
    /// Create a free-form backend error.
    pub fn msg(message: impl Into<String>) -> Self {
        BackendError::Message(message.into())
    }
}

/// Migration execution errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The schema definition has one or more problems.
    #[error("{0}")]
    Schema(#[from] SchemaErrors),

    /// The operation referenced a version that has no migration plan.
    #[error("invalid schema version id={0}")]
    InvalidVersion(VersionId),

    /// The operation requires the version to be applied first.
    #[error("cannot {verb} unapplied version id={id}")]
    Unapplied {
        /// The operation being attempted.
        verb: &'static str,
        /// The version it was attempted on.
        id: VersionId,
    },

    /// A destructive operation would roll back past a locked version.
    #[error("database schema version locked id={0}")]
    Locked(VersionId),

    /// A non-transactional migration failed earlier and has not been forced.
    #[error("previously failed version id={0}, force required")]
    PreviouslyFailed(VersionId),

    /// No driver handles the connection's backend.
    #[error("cannot find migration driver for {0}")]
    NoDriver(String),

    /// The configured version table name is not a plain identifier.
    #[error("invalid migrations table name: {0:?}")]
    InvalidTableName(String),

    /// A migration action failed.
    #[error("migration {version} failed: {source}")]
    Step {
        /// The version whose action failed.
        version: VersionId,
        /// The underlying failure.
        #[source]
        source: BackendError,
    },

    /// The version table or a transaction boundary failed.
    #[error("{context}: {source}")]
    Backend {
        /// What was being done.
        context: String,
        /// The underlying failure.
        #[source]
        source: BackendError,
    },

    /// The caller cancelled the operation.
    #[error("migration cancelled")]
    Cancelled,
}

impl MigrationError {
    pub(crate) fn step(version: VersionId) -> impl FnOnce(BackendError) -> Self {
        move |source| MigrationError::Step { version, source }
    }

    pub(crate) fn backend(context: impl Into<String>) -> impl FnOnce(BackendError) -> Self {
        let context = context.into();
        move |source| MigrationError::Backend { context, source }
    }
}
