//! Waymark command-line tool.

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use waymark_cli::{demo, run, Args, CliError};
use waymark_core::CancellationToken;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("waymark_cli=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = migrate(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn migrate(args: Args) -> Result<(), CliError> {
    let cancel = CancellationToken::new();

    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current step");
            signal.cancel();
        }
    });

    let output = tokio::task::spawn_blocking(move || {
        let mut schema = demo::world_schema();
        run(&args, &mut schema, &cancel, |msg| println!("{}", msg))
    })
    .await??;

    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
