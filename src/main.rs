// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use drydock::pipeline::Driver;
use drydock::queues::QueueRegistry;
use drydock::{HostEnvironment, HostFacts, ProvisionConfig, StageStatus, SystemHost};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "drydock")]
#[command(author, version, about = "Single-host provisioning for a multi-process web stack", long_about = None)]
struct Cli {
    /// Path to the provisioning config (default: /etc/drydock.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full provisioning pipeline
    Provision {
        /// Continue past the minimum-memory check without prompting
        #[arg(long)]
        allow_low_memory: bool,
        /// Log mutations instead of executing them
        #[arg(long)]
        dry_run: bool,
        /// Write a JSON report of per-stage outcomes
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Run only the host capability checks
    Preflight {
        #[arg(long)]
        allow_low_memory: bool,
    },
    /// Set the desired consumer count for a queue
    Consumers {
        /// Queue name
        queue: String,
        /// Desired consumer count
        count: u32,
        /// Overwrite an existing registry entry
        #[arg(long)]
        force: bool,
    },
}

fn load_environment(
    config_path: Option<&PathBuf>,
    allow_low_memory: bool,
) -> Result<HostEnvironment> {
    let mut config = ProvisionConfig::load_or_default(config_path.map(PathBuf::as_path))?;
    config.allow_low_memory = config.allow_low_memory || allow_low_memory;
    Ok(HostEnvironment::from_config(config))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Provision {
            allow_low_memory,
            dry_run,
            report,
        } => {
            let env = load_environment(cli.config.as_ref(), allow_low_memory)?;
            let mut host = SystemHost::new()?.dry_run(dry_run);
            let outcomes = Driver::new(&env, &mut host)?.run()?;
            for outcome in &outcomes {
                let mark = match outcome.status {
                    StageStatus::Applied => "applied",
                    StageStatus::Skipped => "skipped",
                };
                info!("{:<18} {}", outcome.stage, mark);
            }
            if let Some(path) = report {
                std::fs::write(&path, serde_json::to_string_pretty(&outcomes)?)?;
                info!("stage report written to {}", path.display());
            }
        }
        Commands::Preflight { allow_low_memory } => {
            let env = load_environment(cli.config.as_ref(), allow_low_memory)?;
            let facts = HostFacts::probe()?;
            drydock::preflight::validate(&env, &facts)?;
            info!("preflight checks passed");
        }
        Commands::Consumers {
            queue,
            count,
            force,
        } => {
            let env = load_environment(cli.config.as_ref(), false)?;
            let registry = QueueRegistry::new(&env.layout.registry_root);
            if force {
                registry.force_consumer_count(&queue, count)?;
            } else if !registry.set_consumer_count(&queue, count)? {
                info!(
                    "queue {} already registered with {} consumer(s); use --force to overwrite",
                    queue,
                    registry
                        .consumer_count(&queue)?
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "?".to_string())
                );
            }
        }
    }

    Ok(())
}
