// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Overlay Node
//!
//! Entry point for the `overlay-node` binary. Parses CLI arguments,
//! initializes logging, and dispatches to the seed or peer runtime
//! (§6). Both runtimes share the same Prometheus/status HTTP surface,
//! spawned from here once the node's internal state exists.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use overlay_node::cli::{Commands, NodeArgs, OverlayNodeCli};
use overlay_node::logging::{self, LogFormat};
use overlay_node::metrics::NodeMetrics;
use overlay_node::{peer, seed};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = OverlayNodeCli::parse();
    logging::init_logging("overlay_node=info,overlay_core=info", LogFormat::Pretty);

    match cli.command {
        Commands::Seed(args) => run_seed(args).await,
        Commands::Peer(args) => run_peer(args).await,
        Commands::Version => {
            println!("overlay-node {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run_seed(args: NodeArgs) -> Result<()> {
    print_banner("SEED", &args);
    let metrics = Arc::new(NodeMetrics::new());
    seed::run(
        seed::SeedConfig {
            host: args.host,
            port: args.port,
            config_path: args.config,
            data_dir: args.data_dir,
            metrics_port: args.metrics_port,
        },
        metrics,
    )
    .await
}

async fn run_peer(args: NodeArgs) -> Result<()> {
    print_banner("PEER", &args);
    let metrics = Arc::new(NodeMetrics::new());
    peer::run(
        peer::PeerConfig {
            host: args.host,
            port: args.port,
            config_path: args.config,
            data_dir: args.data_dir,
            metrics_port: args.metrics_port,
        },
        metrics,
    )
    .await
}

fn print_banner(role: &str, args: &NodeArgs) {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║            Gossip Overlay Node — {role:<6}             ║");
    println!("╠══════════════════════════════════════════════════════╣");
    println!("║ listen:  {:<45}║", format!("{}:{}", args.host, args.port));
    println!("║ config:  {:<45}║", args.config.display().to_string());
    if let Some(p) = args.metrics_port {
        println!("║ metrics: {:<45}║", format!("http://{}:{}/metrics", args.host, p));
    }
    println!("╚══════════════════════════════════════════════════════╝");
}
