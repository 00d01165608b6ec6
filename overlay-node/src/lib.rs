// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Overlay Node
//!
//! Library half of the `overlay-node` package: the seed and peer runtimes,
//! the wire-level TCP primitives they're built on, and the CLI/logging/
//! metrics/status surface the binary wires up. Split out from `main.rs` so
//! integration tests can drive real seed/peer processes over real sockets
//! (§8 end-to-end scenarios) instead of only exercising their methods
//! in-process.

pub mod api;
pub mod cli;
pub mod logging;
pub mod metrics;
pub mod net;
pub mod peer;
pub mod seed;

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;

use api::{AppState, StatusProvider};
use metrics::NodeMetrics;

/// Binds and serves the `/health`, `/status`, `/metrics` router in the
/// background, if `port` was configured. Returns the task handle so the
/// caller can abort it on shutdown.
pub(crate) async fn spawn_api_server(
    port: Option<u16>,
    status_provider: Arc<dyn StatusProvider>,
    metrics: Arc<NodeMetrics>,
) -> Result<Option<tokio::task::JoinHandle<()>>> {
    let Some(port) = port else { return Ok(None) };
    let state = AppState { status_provider, metrics };
    let router = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("status/metrics HTTP server listening on 0.0.0.0:{}", port);
    Ok(Some(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!("api server exited: {}", e);
        }
    })))
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
