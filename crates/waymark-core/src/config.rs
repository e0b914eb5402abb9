//! Worker configuration.

use crate::error::MigrationError;

/// Default name of the table that records applied versions.
pub const DEFAULT_MIGRATIONS_TABLE: &str = "schema_migrations";

/// Migration worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Table used to keep track of the migrations performed.
    ///
    /// May be schema qualified, such as `admin.schema_migrations`.
    pub migrations_table: String,
}

impl WorkerConfig {
    /// Create a configuration with the default table name.
    pub fn new() -> Self {
        Self {
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
        }
    }

    /// Set the migrations table name.
    pub fn with_migrations_table(mut self, table: impl Into<String>) -> Self {
        self.migrations_table = table.into();
        self
    }

    /// Check that the table name can be written into SQL unquoted.
    pub fn validate(&self) -> Result<(), MigrationError> {
        let parts: Vec<&str> = self.migrations_table.split('.').collect();
        if parts.len() > 2 || !parts.iter().all(|p| is_identifier(p)) {
            return Err(MigrationError::InvalidTableName(
                self.migrations_table.clone(),
            ));
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
