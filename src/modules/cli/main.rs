//! Unibase CLI
//!
//! Command-line interface for the Unibase data-access layer.

use clap::Parser;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use unibase_cli::{Cli, Commands};
use unibase_core::UnibaseError;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), UnibaseError> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Check(cmd) => cmd.execute(&cli.config).await,
        Commands::Query(cmd) => cmd.execute(&cli.config).await,
        Commands::Init(cmd) => cmd.execute().await,
    }
}
