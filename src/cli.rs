//! CLI definitions for bridgewatch.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Bridgewatch CLI.
#[derive(Parser)]
#[command(name = "bridgewatch")]
#[command(about = "Cross-chain bridge monitor")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "config/bridgewatch.toml",
        env = "BRIDGEWATCH_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Also write daily-rotated log files to this directory
    #[arg(long, env = "BRIDGEWATCH_LOG_DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the monitor in foreground (default)
    Run {
        /// Serve /health and /metrics on this address (overrides the config)
        #[arg(long)]
        listen: Option<String>,
    },

    /// Validate the configuration file and exit
    CheckConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_run() {
        let cli = Cli::parse_from(["bridgewatch"]);
        assert!(cli.command.is_none());
        assert!(cli.log_dir.is_none());
    }

    #[test]
    fn test_run_with_listen() {
        let cli = Cli::parse_from(["bridgewatch", "-c", "monitor.toml", "run", "--listen", "0.0.0.0:9000"]);
        assert_eq!(cli.config, PathBuf::from("monitor.toml"));
        match cli.command {
            Some(Commands::Run { listen }) => assert_eq!(listen.as_deref(), Some("0.0.0.0:9000")),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_check_config() {
        let cli = Cli::parse_from(["bridgewatch", "check-config", "--log-dir", "/tmp/logs"]);
        assert!(matches!(cli.command, Some(Commands::CheckConfig)));
        assert_eq!(cli.log_dir, Some(PathBuf::from("/tmp/logs")));
    }
}
