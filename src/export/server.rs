use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::json::DownReport;
use crate::state::ConnectionTracker;

/// Shared state for axum handlers.
struct AppState {
    registry: Registry,
    tracker: Arc<ConnectionTracker>,
}

/// Serve `/metrics`, `/healthz` and `/down` on `bind_addr` until `cancel`
/// fires.
pub async fn serve(
    bind_addr: &str,
    registry: Registry,
    tracker: Arc<ConnectionTracker>,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("listening on {bind_addr}"))?;
    serve_on(listener, registry, tracker, cancel).await
}

/// Like [`serve`], on an already bound listener.
pub async fn serve_on(
    listener: TcpListener,
    registry: Registry,
    tracker: Arc<ConnectionTracker>,
    cancel: CancellationToken,
) -> Result<()> {
    let local_addr = listener.local_addr().context("getting local address")?;

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/down", get(down_handler))
        .with_state(Arc::new(AppState { registry, tracker }));

    tracing::info!(addr = %local_addr, "metrics server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await
        .context("metrics server")?;

    tracing::info!("metrics server stopped");
    Ok(())
}

/// GET /metrics - Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "encoding metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "encoding error".to_string(),
        );
    }

    match String::from_utf8(buffer) {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            tracing::error!(error = %e, "converting metrics to string");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encoding error".to_string(),
            )
        }
    }
}

/// GET /healthz - Simple health check.
async fn healthz_handler() -> &'static str {
    "ok"
}

/// GET /down - JSON snapshot of the down window.
async fn down_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match serde_json::to_string(&DownReport::capture(&state.tracker)) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        ),
        Err(e) => {
            tracing::error!(error = %e, "encoding down report");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                "encoding error".to_string(),
            )
        }
    }
}
