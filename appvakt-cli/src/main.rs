//! ## appvakt-cli
//! **Operational interface for application-scoped network blocking**
//!
//! Thin caller surface over the reconciler: list network-capable
//! applications, flip their blocked state, and keep the persisted blocked
//! set applied from a periodic watch loop.

use clap::Parser;
use appvakt_telemetry::logging::EventLogger;

mod commands;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    EventLogger::init();
    let cli = Cli::parse();
    commands::run_command(cli).await
}
