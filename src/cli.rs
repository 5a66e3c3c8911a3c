use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use crate::{config::Config, error::Error, state::RuntimeState};

/// The command line interface for the bridge.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    pub config: Option<PathBuf>,

    /// Most verbose level logged to stdout (and to file, if enabled)
    #[arg(long, default_value_t = Level::INFO)]
    pub log_level: Level,

    /// Also log to daily rotated files in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Commands available in the command line interface.
#[derive(Subcommand)]
pub enum Commands {
    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),
}

/// Helpful examples for users.
#[derive(Subcommand, Clone)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,

    /// Show an example JSON status, as served by `/status` and `/ws`.
    Status,
}

/// Print what the command asks for.
pub fn handle_command(command: Commands) -> Result<(), Error> {
    match command {
        Commands::Examples(example) => match example {
            Examples::Config => {
                println!("{}", Config::example().serialize_pretty()?);
            }
            Examples::Status => {
                let status = serde_json::to_string_pretty(&RuntimeState::example())
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                println!("{status}");
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_config_and_logging() {
        let cli = Cli::parse_from(["grbl-bridge", "bridge.ron", "--log-level", "debug"]);

        assert_eq!(cli.config, Some(PathBuf::from("bridge.ron")));
        assert_eq!(cli.log_level, Level::DEBUG);
        assert!(cli.command.is_none());
    }

    #[test]
    fn examples_print() {
        handle_command(Commands::Examples(Examples::Config)).unwrap();
        handle_command(Commands::Examples(Examples::Status)).unwrap();
    }
}
