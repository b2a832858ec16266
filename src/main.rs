//! engagerunner: scenario-driven comment engagement through an attached
//! Chrome session.

#![forbid(unsafe_code)]

use clap::Parser;
use engage_core::{ErrorExt, ErrorReporter};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;

const LOG_TARGETS: [&str; 6] = [
    "engagerunner",
    "engagement_service",
    "platform_client",
    "llm_interface",
    "engage_ledger",
    "engage_core",
];

fn log_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    let default = LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",");

    if verbose {
        return EnvFilter::new(default);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            ErrorReporter::new().report_error(&e);
            eprintln!("Error: {}", e.user_friendly_message());
            ExitCode::FAILURE
        }
    }
}
