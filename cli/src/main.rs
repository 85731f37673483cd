//! Skyforge CLI - provision cloud nodes from layouts and deploy onto them

#![cfg_attr(test, allow(clippy::expect_used))]

use std::process::ExitCode;

use clap::Parser;
use skyforge_cli::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr, filtered by `SKYFORGE_LOG`, then `RUST_LOG`, default `warn`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("SKYFORGE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
