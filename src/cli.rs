use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Top-level CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "sold-car-tracker",
    version,
    about = "Tracks vehicle auction listings and records sold and referred lots"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// TOML configuration file layered over the built-in defaults.
    #[arg(global = true, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Subcommand to execute; `run` when none was given
    pub fn command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or(Commands::Run(RunArgs::default()))
    }
}

/// Supported subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Discover new listings, then resolve every pending listing.
    Run(RunArgs),
    /// Only discover new listings and update the pending list.
    Discover,
    /// Only resolve the listings already in the pending list.
    Ingest,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Go straight to ingestion without visiting search result pages.
    #[arg(long)]
    pub skip_discovery: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_run_with_discovery() {
        let cli = Cli::try_parse_from(["sold-car-tracker"]).unwrap();
        assert!(matches!(cli.command(), Commands::Run(RunArgs { skip_discovery: false })));
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "sold-car-tracker",
            "run",
            "--skip-discovery",
            "--config",
            "tracker.toml",
            "-vv",
        ])
        .unwrap();

        assert!(matches!(cli.command(), Commands::Run(RunArgs { skip_discovery: true })));
        assert_eq!(cli.config, Some(PathBuf::from("tracker.toml")));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn ingest_subcommand_parses() {
        let cli = Cli::try_parse_from(["sold-car-tracker", "ingest"]).unwrap();
        assert!(matches!(cli.command(), Commands::Ingest));
    }
}
