//! CLI commands

mod check;
mod init;
mod query;

pub use check::CheckCommand;
pub use init::InitCommand;
pub use query::QueryCommand;

use clap::{Parser, Subcommand};
use tracing::warn;
use unibase_runtime::CancellationToken;

/// Unibase - one data-access layer over SQL, document, cache, file and API backends
#[derive(Parser, Debug)]
#[command(name = "unibase")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    ///
    /// Global, so it may follow the subcommand: `unibase check -f prod.yaml`.
    #[arg(short = 'f', long = "file", global = true, default_value = "unibase.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to every configured connector and report its health
    Check(CheckCommand),

    /// Run a generic query against one connector
    Query(QueryCommand),

    /// Write a starter configuration
    Init(InitCommand),
}

/// Token cancelled on Ctrl-C
pub(crate) fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            trigger.cancel();
        }
    });
    token
}
