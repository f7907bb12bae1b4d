// src/server/metrics_server.rs

use crate::core::metrics::{self, gather_metrics};
use crate::core::state::ServerState;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// Handles HTTP requests to the /metrics endpoint.
///
/// It updates dynamic gauges before gathering all registered metrics
/// and encoding them in the Prometheus text format.
async fn metrics_handler(state: Arc<ServerState>) -> impl IntoResponse {
    let active = state.broker.channel_count() + state.broker.pattern_count();
    metrics::PUBSUB_ACTIVE_SUBSCRIPTIONS.set(active as f64);

    let body = gather_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

/// Serves Prometheus metrics on /metrics until shutdown.
///
/// The listener is bound during startup so that a port conflict is a startup error.
pub async fn run_metrics_server(
    state: Arc<ServerState>,
    listener: TcpListener,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(move || metrics_handler(state.clone())));

    if let Ok(addr) = listener.local_addr() {
        info!(
            "Prometheus metrics server listening on http://{}/metrics",
            addr
        );
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("Metrics server shutting down.");
        })
        .await?;
    Ok(())
}
