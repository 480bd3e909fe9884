use std::process::ExitCode;

use anyhow::{Context, Result};
use sold_car_tracker::application::Pipeline;
use sold_car_tracker::cli::{Cli, Commands};
use sold_car_tracker::infrastructure::{AppConfig, init_logging};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _logging = match init_logging(&config.logging, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match execute(&cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: &Cli, config: AppConfig) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "Sold car tracker starting");
    let pipeline = Pipeline::from_config(config)
        .await
        .context("Failed to build pipeline")?;

    match cli.command() {
        Commands::Run(args) => {
            let summary = pipeline.run(args.skip_discovery).await?;
            println!("{summary}");
        }
        Commands::Discover => {
            let report = pipeline.discover().await?;
            println!(
                "visited {} pages, found {} new listings",
                report.pages_visited,
                report.new_links.len()
            );
        }
        Commands::Ingest => {
            let summary = pipeline.ingest().await?;
            println!("{summary}");
        }
    }
    Ok(())
}
