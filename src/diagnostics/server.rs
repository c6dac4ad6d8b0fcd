//! Diagnostics HTTP server.

use crate::pipeline::{RunStats, StatsSnapshot};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use log::info;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Routes: `GET /health`, `GET /stats`
pub fn router(stats: Arc<RunStats>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(current_stats))
        .with_state(stats)
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

async fn current_stats(State(stats): State<Arc<RunStats>>) -> Json<StatsSnapshot> {
    Json(stats.snapshot())
}

/// Bind the diagnostics listener, e.g. `localhost:6060`
pub async fn bind(addr: &str) -> io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Serve until `shutdown` is cancelled
pub async fn serve(
    listener: TcpListener,
    stats: Arc<RunStats>,
    shutdown: CancellationToken,
) -> io::Result<()> {
    info!("Diagnostics listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(stats))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
