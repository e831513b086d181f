//! Bridgewatch - cross-chain bridge monitor
//!
//! Main entry point for the bridgewatch CLI.

mod cli;
mod server;

use clap::Parser;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    server::init_tracing(cli.log_dir.as_deref())?;

    match cli.command.unwrap_or(Commands::Run { listen: None }) {
        Commands::Run { listen } => server::run(&cli.config, listen).await,
        Commands::CheckConfig => server::check_config(&cli.config),
    }
}
