//! # Prometheus Metrics
//!
//! Exposes operational metrics for a seed or peer node. Scraped by
//! Prometheus at the `/metrics` HTTP endpoint.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so
//! they do not collide with any default global registry consumers. A
//! single struct serves both roles — a seed only ever touches the
//! membership/consensus gauges, a peer only the gossip/neighbor/suspicion
//! ones — so one `/metrics` exposition format stays stable regardless of
//! which binary subcommand is running.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it can
/// be shared across request handlers and background tasks.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,

    // ── Seed-side ───────────────────────────────────────────────────────
    /// Current size of this seed's authoritative membership.
    pub membership_size: IntGauge,
    /// Total register proposals decided, broken out by outcome.
    pub proposals_approved_total: IntCounter,
    pub proposals_rejected_total: IntCounter,
    /// Total confirmed dead-node removals.
    pub removals_confirmed_total: IntCounter,

    // ── Peer-side ───────────────────────────────────────────────────────
    /// Gossip messages this peer has originated.
    pub gossip_generated_total: IntCounter,
    /// Gossip messages this peer has forwarded (originated or relayed).
    pub gossip_forwarded_total: IntCounter,
    /// Current neighbor count in this peer's overlay.
    pub active_neighbors: IntGauge,
    /// Peer-level suspicion rounds initiated and confirmed.
    pub suspicion_rounds_initiated_total: IntCounter,
    pub suspicion_rounds_confirmed_total: IntCounter,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("overlay".into()), None)
            .expect("failed to create prometheus registry");

        let membership_size =
            IntGauge::new("membership_size", "Current size of the seed's authoritative membership")
                .expect("metric creation");
        registry.register(Box::new(membership_size.clone())).expect("metric registration");

        let proposals_approved_total = IntCounter::new(
            "proposals_approved_total",
            "Total register/remove proposals approved by quorum",
        )
        .expect("metric creation");
        registry.register(Box::new(proposals_approved_total.clone())).expect("metric registration");

        let proposals_rejected_total = IntCounter::new(
            "proposals_rejected_total",
            "Total register/remove proposals rejected by quorum",
        )
        .expect("metric creation");
        registry.register(Box::new(proposals_rejected_total.clone())).expect("metric registration");

        let removals_confirmed_total = IntCounter::new(
            "removals_confirmed_total",
            "Total dead-node removals confirmed by seed consensus",
        )
        .expect("metric creation");
        registry.register(Box::new(removals_confirmed_total.clone())).expect("metric registration");

        let gossip_generated_total =
            IntCounter::new("gossip_generated_total", "Total gossip messages this peer originated")
                .expect("metric creation");
        registry.register(Box::new(gossip_generated_total.clone())).expect("metric registration");

        let gossip_forwarded_total = IntCounter::new(
            "gossip_forwarded_total",
            "Total gossip messages this peer forwarded to a neighbor",
        )
        .expect("metric creation");
        registry.register(Box::new(gossip_forwarded_total.clone())).expect("metric registration");

        let active_neighbors =
            IntGauge::new("active_neighbors", "Current neighbor count in this peer's overlay")
                .expect("metric creation");
        registry.register(Box::new(active_neighbors.clone())).expect("metric registration");

        let suspicion_rounds_initiated_total = IntCounter::new(
            "suspicion_rounds_initiated_total",
            "Total peer-level suspicion consensus rounds initiated",
        )
        .expect("metric creation");
        registry
            .register(Box::new(suspicion_rounds_initiated_total.clone()))
            .expect("metric registration");

        let suspicion_rounds_confirmed_total = IntCounter::new(
            "suspicion_rounds_confirmed_total",
            "Total peer-level suspicion consensus rounds that confirmed a dead neighbor",
        )
        .expect("metric creation");
        registry
            .register(Box::new(suspicion_rounds_confirmed_total.clone()))
            .expect("metric registration");

        Self {
            registry,
            membership_size,
            proposals_approved_total,
            proposals_rejected_total,
            removals_confirmed_total,
            gossip_generated_total,
            gossip_forwarded_total,
            active_neighbors,
            suspicion_rounds_initiated_total,
            suspicion_rounds_confirmed_total,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers via extension.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
