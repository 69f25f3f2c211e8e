//! clusterctl - start, stop, and inspect YARN compute clusters.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cluster_orchestrator::{
    ClusterOrchestrator, ClusterRecord, ClusterState, OrchestratorConfig, OrchestratorError,
    StartRequest,
};

/// clusterctl - manage compute clusters on a YARN resource manager.
#[derive(Parser)]
#[command(name = "clusterctl")]
#[command(about = "Start, stop, and inspect compute clusters")]
struct Cli {
    /// Path to the orchestrator configuration file.
    #[arg(long, env = "CLUSTER_ORCH_CONFIG", default_value = "clusters.toml")]
    config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Print records as JSON.
    #[arg(long, default_value = "false")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new cluster.
    Start {
        /// Cluster name.
        name: String,

        /// Engine to build the cluster from.
        #[arg(long)]
        engine: String,

        /// Number of nodes to provision.
        #[arg(short = 'n', long, default_value = "1")]
        size: u32,

        /// Maximum memory per node.
        #[arg(short, long, default_value = "10g")]
        memory: String,

        /// Principal to launch the cluster for.
        #[arg(long, env = "USER")]
        principal: String,
    },

    /// Stop a running cluster.
    Stop {
        /// Cluster name.
        name: String,
    },

    /// Delete a stopped cluster.
    Delete {
        /// Cluster name.
        name: String,
    },

    /// Show a cluster record.
    Get {
        /// Cluster name.
        name: String,
    },

    /// List all clusters.
    List,

    /// Poll a cluster and update its state from the result.
    Status {
        /// Cluster name.
        name: String,
    },
}

fn colored_state(state: ClusterState) -> String {
    match state {
        ClusterState::Started => state.to_string().green().to_string(),
        ClusterState::Stopped => state.to_string().dimmed().to_string(),
        ClusterState::Unknown => state.to_string().yellow().to_string(),
    }
}

fn print_record(record: &ClusterRecord) {
    println!("\nCluster Details:");
    println!("  Name:        {}", record.name);
    println!("  State:       {}", colored_state(record.state));
    println!("  Engine:      {}", record.engine);
    println!("  Size:        {}", record.size);
    println!("  Memory:      {}", record.memory);
    println!("  Owner:       {}", record.owner);
    println!(
        "  Address:     {}",
        record.address.as_deref().unwrap_or_default()
    );
    println!(
        "  Application: {}",
        record.application_id.as_deref().unwrap_or_default()
    );
    println!("  Output dir:  {}", record.output_dir);
    println!("  Created:     {}", record.created_at.to_rfc3339());
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = OrchestratorConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let orchestrator =
        ClusterOrchestrator::from_config(&config).context("Failed to create orchestrator")?;

    match cli.command {
        Commands::Start {
            name,
            engine,
            size,
            memory,
            principal,
        } => {
            let record = orchestrator
                .start_cluster(StartRequest {
                    name,
                    engine,
                    size,
                    memory,
                    principal,
                })
                .await?;
            if cli.json {
                print_json(&record)?;
            } else {
                println!(
                    "{} Cluster {} started at {}",
                    "✅".green(),
                    record.name,
                    record.address.as_deref().unwrap_or_default()
                );
            }
        }

        Commands::Stop { name } => {
            let stopped = orchestrator.stop_cluster(&name).await?;
            println!(
                "Cluster {} is {}",
                stopped.record.name,
                colored_state(stopped.record.state)
            );
            if let Some(e) = stopped.cleanup_error {
                eprintln!(
                    "{} Output directory {} was not removed: {e}",
                    "⚠".yellow(),
                    stopped.record.output_dir
                );
            }
        }

        Commands::Delete { name } => {
            orchestrator.delete_cluster(&name).await?;
            println!("Cluster {name} deleted");
        }

        Commands::Get { name } => {
            let record = orchestrator.get_cluster(&name).await?;
            if cli.json {
                print_json(&record)?;
            } else {
                print_record(&record);
            }
        }

        Commands::List => {
            let records = orchestrator.list_clusters().await?;
            if cli.json {
                print_json(&records)?;
            } else {
                println!(
                    "\n{:<24} {:<10} {:<12} {:<6} {:<22}",
                    "NAME", "STATE", "ENGINE", "SIZE", "ADDRESS"
                );
                println!("{}", "-".repeat(78));
                for record in records {
                    println!(
                        "{:<24} {:<10} {:<12} {:<6} {:<22}",
                        record.name,
                        record.state,
                        record.engine,
                        record.size,
                        record.address.unwrap_or_default()
                    );
                }
            }
        }

        Commands::Status { name } => match orchestrator.refresh_cluster(&name).await {
            Ok(status) => {
                if cli.json {
                    print_json(&status)?;
                } else {
                    print_record(&status.record);
                    let health = &status.health;
                    println!(
                        "  Healthy:     {}",
                        if health.is_healthy {
                            "yes".green()
                        } else {
                            "no".red()
                        }
                    );
                    println!("  Version:     {}", health.engine_version);
                    println!(
                        "  CPUs:        {} ({} allowed)",
                        health.total_cpu, health.allowed_cpu
                    );
                    println!("  Memory:      {} bytes", health.total_memory_bytes);
                }
            }
            Err(e @ OrchestratorError::Unreachable { .. }) => {
                eprintln!("{} {e}", "⚠".yellow());
                std::process::exit(2);
            }
            Err(e) => return Err(e.into()),
        },
    }

    Ok(())
}
