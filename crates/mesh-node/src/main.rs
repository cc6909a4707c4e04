//! # Relay Mesh Node
//!
//! The executable entry point for one mesh node.
//!
//! ## Startup Sequence
//!
//! 1. Parse CLI options and load configuration (TOML file or defaults)
//! 2. Initialize tracing
//! 3. Build the node runtime (join cluster, wire store and transport)
//! 4. Register processing units and start the message system
//! 5. Wait for the directory to converge, then serve until ctrl-c

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use mesh_node::{echo, NodeRuntime};
use mesh_runtime::PatternActionsRegistry;
use mesh_types::NodeConfig;

/// CLI options for a mesh node.
#[derive(Debug, Parser)]
#[command(name = "mesh-node", about = "A content-based pub/sub mesh node")]
struct Options {
    /// The node identifier. Must be unique in the cluster.
    #[arg(short, long)]
    node: Option<String>,

    /// The config file to load.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The roles assigned to this node.
    #[arg(short, long)]
    roles: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::default().add_directive(Level::INFO.into())),
        )
        .init();

    let mut config = match &options.config {
        Some(path) => NodeConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => NodeConfig::default(),
    };
    if let Some(node_id) = options.node {
        config.node_id = node_id;
    }
    config.roles.extend(options.roles);

    info!("===========================================");
    info!("  Relay Mesh Node v{}", env!("CARGO_PKG_VERSION"));
    info!("  Node: {} ({})", config.node_id, config.system_name);
    info!("===========================================");

    let runtime = NodeRuntime::builder(config)
        .build()
        .context("invalid node configuration")?;

    let mut registry = PatternActionsRegistry::new();
    echo::register(&mut registry).context("failed to register the echo unit")?;

    runtime
        .start(registry)
        .await
        .context("message system did not start")?;

    info!("Node up; press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    runtime.shutdown().await;
    Ok(())
}
