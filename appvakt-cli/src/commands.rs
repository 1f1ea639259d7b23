use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use appvakt_config::{AppvaktConfig, JsonBlockedSetStore};
use appvakt_core::inventory::ProcessInventory;
use appvakt_engine::RuleReconciler;
use appvakt_firewall::{platform_backend, BackendOptions};
use appvakt_inventory::SystemInventory;
use appvakt_telemetry::metrics::MetricsRecorder;

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Alternative configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List running applications with network activity
    List(ListArgs),
    /// Block an application's network access
    Block(TargetArgs),
    /// Restore an application's network access
    Unblock(TargetArgs),
    /// Show whether an application is currently blocked
    Status(TargetArgs),
    /// Periodically re-apply the persisted blocked set
    Watch(WatchArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Emit records as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Path to the application's executable
    pub path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Seconds between reconcile passes (overrides the configured value)
    #[arg(long)]
    pub interval: Option<u64>,
}

pub async fn run_command(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = match &cli.config {
        Some(path) => AppvaktConfig::load_from_path(path)?,
        None => AppvaktConfig::load()?,
    };

    let inventory: Arc<dyn ProcessInventory> = Arc::new(SystemInventory::new());
    let options = BackendOptions {
        chain_name: config.firewall.chain_name.clone(),
        rule_prefix: config.firewall.rule_prefix.clone(),
        command_timeout: Duration::from_secs(config.firewall.command_timeout_secs),
    };
    let backend = platform_backend(&options, inventory.clone())?;
    let registry = Arc::new(JsonBlockedSetStore::default_location()?);
    let reconciler = RuleReconciler::new(backend, inventory, registry, MetricsRecorder::new());

    match cli.command {
        Commands::List(args) => {
            let records = reconciler.list_network_applications().await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                println!("{:<8} {:<24} {:<8} PATH", "PID", "NAME", "BLOCKED");
                for record in &records {
                    println!(
                        "{:<8} {:<24} {:<8} {}",
                        record.pid,
                        record.name,
                        record.blocked,
                        record.canonical_path.display()
                    );
                }
                info!(count = records.len(), "applications with network access");
            }
        }
        Commands::Block(args) => {
            reconciler.ensure_initialized().await?;
            reconciler.set_blocked(&args.path, true).await?;
            println!("blocked {}", args.path.display());
        }
        Commands::Unblock(args) => {
            reconciler.ensure_initialized().await?;
            reconciler.set_blocked(&args.path, false).await?;
            println!("unblocked {}", args.path.display());
        }
        Commands::Status(args) => {
            let blocked = reconciler.is_blocked(&args.path).await?;
            println!(
                "{}: {}",
                args.path.display(),
                if blocked { "blocked" } else { "allowed" }
            );
        }
        Commands::Watch(args) => {
            let interval = Duration::from_secs(
                args.interval
                    .unwrap_or(config.controller.refresh_interval_secs),
            );
            let auto_block = config.controller.auto_block_new_apps;
            reconciler.ensure_initialized().await?;
            info!(
                interval_secs = interval.as_secs(),
                auto_block, "watch loop started"
            );
            loop {
                match reconciler.reconcile(auto_block).await {
                    Ok(report) => {
                        if !report.failed.is_empty() {
                            error!(failed = report.failed.len(), "reconcile pass had failures");
                        }
                    }
                    Err(e) => error!(error = %e, "reconcile pass aborted"),
                }
                tokio::time::sleep(interval).await;
            }
        }
    }
    Ok(())
}
