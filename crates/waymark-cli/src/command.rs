//! The `migrate` subcommand tree.
//!
//! [`MigrateCommand`] is a clap subcommand that any program embedding a
//! waymark schema can mount, and [`execute`] runs it against a worker.

use clap::Subcommand;
use tracing::debug;
use waymark_core::{CancellationToken, Connection, VersionId, Worker};

use crate::error::CliError;
use crate::format::{filter_listed, Formatter};

/// Database migration commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum MigrateCommand {
    /// Apply all database migrations.
    Up,

    /// Roll back database migrations, stopping at the most recent locked version.
    Down,

    /// Migrate up or down to a specific version (0 removes everything).
    Goto {
        /// Target version.
        #[arg(value_parser = parse_version)]
        version: VersionId,
    },

    /// Force the database schema version after an error.
    Force {
        /// Version to force (0 forces an empty schema).
        #[arg(value_parser = parse_version)]
        version: VersionId,
    },

    /// Lock a database schema version: prevent down migrations.
    Lock {
        /// Version to lock.
        #[arg(value_parser = parse_version)]
        version: VersionId,
    },

    /// Unlock a database schema version: allow down migrations.
    Unlock {
        /// Version to unlock.
        #[arg(value_parser = parse_version)]
        version: VersionId,
    },

    /// List database versions and their status.
    List {
        /// List all versions, including those behind the most recent lock.
        #[arg(short, long)]
        all: bool,
    },

    /// Show database schema version details.
    Show {
        /// Version to show.
        #[arg(value_parser = parse_version)]
        version: VersionId,
    },
}

impl MigrateCommand {
    /// Name of the subcommand, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            MigrateCommand::Up => "up",
            MigrateCommand::Down => "down",
            MigrateCommand::Goto { .. } => "goto",
            MigrateCommand::Force { .. } => "force",
            MigrateCommand::Lock { .. } => "lock",
            MigrateCommand::Unlock { .. } => "unlock",
            MigrateCommand::List { .. } => "list",
            MigrateCommand::Show { .. } => "show",
        }
    }
}

/// Parse a version argument.
pub fn parse_version(s: &str) -> Result<VersionId, CliError> {
    let n: i64 = s
        .trim()
        .parse()
        .map_err(|_| CliError::InvalidVersion(s.to_string()))?;
    if n < 0 {
        return Err(CliError::NegativeVersion(n));
    }
    Ok(VersionId(n))
}

/// Run a command against a worker.
///
/// Progress of state-changing commands goes to the worker's progress
/// callback. The returned string is the formatted output of `list` and
/// `show`, and is empty otherwise.
pub fn execute<C: Connection>(
    worker: &mut Worker<C>,
    command: &MigrateCommand,
    cancel: &CancellationToken,
    formatter: &dyn Formatter,
) -> Result<String, CliError> {
    debug!(command = command.name(), "executing migrate command");

    match command {
        MigrateCommand::Up => worker.up(cancel)?,
        MigrateCommand::Down => worker.down(cancel)?,
        MigrateCommand::Goto { version } => worker.goto(cancel, *version)?,
        MigrateCommand::Force { version } => worker.force(cancel, *version)?,
        MigrateCommand::Lock { version } => worker.lock(cancel, *version)?,
        MigrateCommand::Unlock { version } => worker.unlock(cancel, *version)?,
        MigrateCommand::List { all } => {
            let versions = filter_listed(worker.versions(cancel)?, *all);
            return Ok(formatter.format_versions(&versions));
        }
        MigrateCommand::Show { version } => {
            let version = worker.version(cancel, *version)?;
            return Ok(formatter.format_version(&version));
        }
    }

    Ok(String::new())
}
