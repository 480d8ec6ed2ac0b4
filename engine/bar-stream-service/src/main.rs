//! Bar Stream Service
//!
//! Connects to the market data stream, counts incoming bars and prints the running total
//! every report interval until Ctrl+C. Exits non-zero if the stream cannot be established or
//! fails while running.

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use tracing::info;

use bar_stream_service::{initialize_logging, load_configuration, run_service, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_configuration(&cli).context("Failed to load configuration") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = initialize_logging(&config.logging) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting bar stream v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {:?}", config.stream);

    ExitCode::from(run_service(config).await)
}
