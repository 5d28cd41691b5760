//! HTTP transport for workflow metrics.
//!
//! The sampler process serves its accumulated series as JSON on
//! `GET /metrics`; the post-run renderer pulls it back with
//! [`MetricsClient`].

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::header,
    response::{IntoResponse, Json},
    routing::get,
};
use log::info;
use serde::Serialize;
use tokio::net::TcpListener;

use workflow_metrics_core::{Sampler, SamplerHealth};

pub mod client;

pub use client::{DEFAULT_TIMEOUT, FetchError, MetricsClient};

/// Port the sampler listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 7777;

/// Path of the snapshot endpoint.
pub const METRICS_PATH: &str = "/metrics";

/// Shared server state.
struct AppState {
    sampler: Arc<Sampler>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: &'static str,
    #[serde(flatten)]
    sampler: SamplerHealth,
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(state.sampler.snapshot()),
    )
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.sampler.health();
    Json(HealthResponse {
        status: if health.last_error.is_none() {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: workflow_metrics_core::VERSION,
        sampler: health,
    })
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "Workflow Metrics Sampler",
        "version": workflow_metrics_core::VERSION,
        "interval_ms": state.sampler.interval().as_millis() as u64,
        "endpoints": {
            "/": "This API index",
            "/metrics": {
                "method": "GET",
                "description": "Snapshot of all CPU and memory samples collected so far",
            },
            "/health": "Sampler health and counters",
        },
    }))
}

/// Build the axum router over a shared sampler.
pub fn build_router(sampler: Arc<Sampler>) -> Router {
    let state = Arc::new(AppState { sampler });

    Router::new()
        .route("/", get(handle_index))
        .route(METRICS_PATH, get(handle_metrics))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    sampler: Arc<Sampler>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    info!("serving metrics on http://{}", listener.local_addr()?);
    axum::serve(listener, build_router(sampler))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Bind `host:port` and serve until `shutdown` resolves.
///
/// Bind failures (port in use, bad address) are returned to the caller.
pub async fn run_server(
    sampler: Arc<Sampler>,
    host: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    serve(listener, sampler, shutdown).await
}
