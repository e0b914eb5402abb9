//! Waymark CLI - command-line front end for the migration worker.
//!
//! Programs that own a [`Schema`] mount [`MigrateCommand`] in their own clap
//! tree and call [`execute`]. The `waymark` binary does the same with the
//! built-in [`demo::world_schema`] against a SQLite database file.

pub mod command;
pub mod config;
pub mod demo;
pub mod error;
pub mod format;

pub use command::{execute, parse_version, MigrateCommand};
pub use config::{Args, DEFAULT_DATABASE};
pub use error::CliError;
pub use format::{create_formatter, filter_listed, Formatter, OutputFormat};

use tracing::info;
use waymark_core::{CancellationToken, Schema, SqliteConnection, Worker};

/// Open the database named by `args` and run its command.
///
/// Progress messages go to `progress`. Returns the formatted output of
/// `list` and `show`.
pub fn run<F>(
    args: &Args,
    schema: &mut Schema,
    cancel: &CancellationToken,
    progress: F,
) -> Result<String, CliError>
where
    F: Fn(&str) + Send + Sync + 'static,
{
    info!(database = %args.database.display(), table = %args.table, "opening database");

    let conn = SqliteConnection::open(&args.database)?;
    let mut worker = Worker::new(conn, schema, args.into_config())?.with_progress(progress);
    let formatter = create_formatter(args.format);

    execute(&mut worker, &args.command, cancel, formatter.as_ref())
}
