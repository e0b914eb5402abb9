//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;
use waymark_core::{WorkerConfig, DEFAULT_MIGRATIONS_TABLE};

use crate::command::MigrateCommand;
use crate::format::OutputFormat;

/// Default SQLite database file.
pub const DEFAULT_DATABASE: &str = "./waymark.db";

/// Command-line arguments for the migration tool.
#[derive(Parser, Debug)]
#[command(name = "waymark")]
#[command(version, about = "Database schema migrations", long_about = None)]
pub struct Args {
    /// Path to the SQLite database file.
    #[arg(short, long, default_value = DEFAULT_DATABASE)]
    pub database: PathBuf,

    /// Table used to record applied versions.
    #[arg(long, default_value = DEFAULT_MIGRATIONS_TABLE)]
    pub table: String,

    /// Output format for list and show.
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: MigrateCommand,
}

impl Args {
    /// Worker configuration for these arguments.
    pub fn into_config(&self) -> WorkerConfig {
        WorkerConfig::new().with_migrations_table(self.table.clone())
    }
}
