use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vast_rest::RestClient;
use vast_share::{AccessRule, Config, Reconciler, Share, SnapshotRequest};

#[derive(Parser)]
#[command(name = "vast-share")]
#[command(about = "Manage NFS shares on a VAST cluster", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check connectivity and create the root export if missing
    Setup,

    /// Show backend capacity
    Stats,

    /// Make sure a share exists and print all export locations
    Ensure {
        /// Share ID
        id: String,

        /// Size in GiB
        #[arg(short, long)]
        size: u64,

        /// Share protocol
        #[arg(long, default_value = "NFS")]
        proto: String,
    },

    /// Create a share and print its export location
    Create {
        /// Share ID
        id: String,

        /// Size in GiB
        #[arg(short, long)]
        size: u64,

        /// Share protocol
        #[arg(long, default_value = "NFS")]
        proto: String,
    },

    /// Delete a share and move its data aside
    Delete {
        /// Share ID
        id: String,
    },

    /// Grow a share
    Extend {
        /// Share ID
        id: String,

        /// New size in GiB
        #[arg(short, long)]
        size: u64,
    },

    /// Shrink a share
    Shrink {
        /// Share ID
        id: String,

        /// New size in GiB
        #[arg(short, long)]
        size: u64,
    },

    /// Replace the access rules of a share
    Access {
        /// Share ID
        id: String,

        /// Rule as TYPE:LEVEL:TO, e.g. ip:rw:10.0.0.5 (repeatable)
        #[arg(short, long = "rule")]
        rules: Vec<String>,

        /// Share protocol
        #[arg(long, default_value = "NFS")]
        proto: String,
    },

    /// Snapshot a share
    SnapshotCreate {
        /// Share ID
        share_id: String,

        /// Snapshot name
        name: String,
    },

    /// Delete a snapshot by name
    SnapshotDelete {
        /// Share ID
        share_id: String,

        /// Snapshot name
        name: String,
    },
}

fn parse_rule(rule: &str) -> Result<AccessRule> {
    let mut parts = rule.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(access_type), Some(access_level), Some(access_to)) if !access_to.is_empty() => {
            Ok(AccessRule {
                access_type: access_type.to_string(),
                access_level: access_level.to_string(),
                access_to: access_to.to_string(),
            })
        }
        _ => Err(anyhow!("invalid rule '{}', expected TYPE:LEVEL:TO", rule)),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vast_share=info,vast_rest=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    info!(host = %config.mgmt_host, pool = %config.vippool_name, "Connecting to VAST");

    let client = RestClient::new(&config.rest_config()).context("Failed to create REST client")?;
    let reconciler = Reconciler::new(&config, Arc::new(client));

    let share = |id: String, size: u64, proto: String| Share {
        id,
        size,
        share_proto: proto,
    };

    match cli.command {
        Commands::Setup => reconciler.setup().await?,
        Commands::Stats => print_json(&reconciler.share_stats().await?)?,
        Commands::Ensure { id, size, proto } => {
            print_json(&reconciler.ensure_share(&share(id, size, proto)).await?)?
        }
        Commands::Create { id, size, proto } => {
            print_json(&reconciler.create_share(&share(id, size, proto)).await?)?
        }
        Commands::Delete { id } => reconciler.delete_share(&Share::new(id, 0)).await?,
        Commands::Extend { id, size } => {
            reconciler.extend_share(&Share::new(id, 0), size).await?
        }
        Commands::Shrink { id, size } => {
            reconciler.shrink_share(&Share::new(id, 0), size).await?
        }
        Commands::Access { id, rules, proto } => {
            let rules = rules
                .iter()
                .map(|r| parse_rule(r))
                .collect::<Result<Vec<_>>>()?;
            reconciler
                .update_access(&share(id, 0, proto), &rules)
                .await?
        }
        Commands::SnapshotCreate { share_id, name } => {
            reconciler
                .create_snapshot(&SnapshotRequest {
                    name,
                    share_instance_id: share_id,
                })
                .await?
        }
        Commands::SnapshotDelete { share_id, name } => {
            reconciler
                .delete_snapshot(&SnapshotRequest {
                    name,
                    share_instance_id: share_id,
                })
                .await?
        }
    }

    Ok(())
}
