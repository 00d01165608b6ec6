//! # Status & Metrics API
//!
//! Builds the axum router exposing a node's HTTP interface — a `/status`
//! introspection endpoint (the "supplemental features" recovered from the
//! original `get_status()` accessors) alongside Prometheus `/metrics`.
//!
//! ## Endpoints
//!
//! | Method | Path       | Description                              |
//! |--------|------------|-------------------------------------------|
//! | GET    | `/health`  | Liveness probe                            |
//! | GET    | `/status`  | Seed or peer status snapshot (JSON)       |
//! | GET    | `/metrics` | Prometheus text exposition                |

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use std::sync::Arc;

use crate::metrics::{metrics_handler, SharedMetrics};

/// Anything that can produce a point-in-time status snapshot for `/status`.
/// Implemented by the seed and peer runtimes with their own shape — the
/// route doesn't need to know which.
pub trait StatusProvider: Send + Sync {
    fn status(&self) -> serde_json::Value;
}

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub status_provider: Arc<dyn StatusProvider>,
    pub metrics: SharedMetrics,
}

/// Builds the full axum [`Router`] with all API routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — returns the seed/peer status snapshot.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.status_provider.status())
}

impl axum::extract::FromRef<AppState> for SharedMetrics {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NodeMetrics;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct FixedStatus;
    impl StatusProvider for FixedStatus {
        fn status(&self) -> serde_json::Value {
            serde_json::json!({ "seed_id": "127.0.0.1:6000", "peer_count": 2 })
        }
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let state = AppState { status_provider: Arc::new(FixedStatus), metrics: Arc::new(NodeMetrics::new()) };
        let router = create_router(state);
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_reflects_the_provider() {
        let state = AppState { status_provider: Arc::new(FixedStatus), metrics: Arc::new(NodeMetrics::new()) };
        let router = create_router(state);
        let response = router
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["peer_count"], 2);
    }

    #[tokio::test]
    async fn metrics_route_serves_prometheus_text() {
        let state = AppState { status_provider: Arc::new(FixedStatus), metrics: Arc::new(NodeMetrics::new()) };
        let router = create_router(state);
        let response = router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
