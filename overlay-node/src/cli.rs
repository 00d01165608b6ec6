//! # CLI Interface
//!
//! Defines the command-line argument structure for `overlay-node` using
//! `clap` derive. Supports two roles — `seed` and `peer` — plus `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Gossip overlay node: runs as either a seed or a peer.
#[derive(Parser, Debug)]
#[command(
    name = "overlay-node",
    about = "Gossip overlay seed/peer node",
    version,
    propagate_version = true
)]
pub struct OverlayNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the overlay node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run as a seed node — a membership authority participating in quorum
    /// consensus with the other configured seeds.
    Seed(NodeArgs),
    /// Run as a peer node — registers with a seed quorum, builds a gossip
    /// overlay, and disseminates messages over it.
    Peer(NodeArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments shared by `seed` and `peer`.
#[derive(Parser, Debug)]
pub struct NodeArgs {
    /// Host/IP this node binds its listener to.
    #[arg(long, env = "OVERLAY_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port this node binds its listener to.
    #[arg(long, short = 'p', env = "OVERLAY_PORT")]
    pub port: u16,

    /// Path to the seed list config file (one `host:port` per line).
    #[arg(long, short = 'c', env = "OVERLAY_CONFIG", default_value = "config.txt")]
    pub config: PathBuf,

    /// Directory for this node's event log (`outputfile.txt`).
    #[arg(long, short = 'd', env = "OVERLAY_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Port for the Prometheus `/metrics` and `/status` HTTP endpoint.
    /// Omit to disable the HTTP surface entirely.
    #[arg(long, env = "OVERLAY_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        OverlayNodeCli::command().debug_assert();
    }
}
