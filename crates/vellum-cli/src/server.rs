//! Metrics and health endpoints served alongside the watcher.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use vellum_metrics::MetricsCollector;
use vellum_store::VectorStore;

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricsCollector>,
    pub store: Arc<dyn VectorStore>,
}

#[derive(Debug, Deserialize)]
struct MetricsQuery {
    format: Option<String>,
}

async fn metrics_handler(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Response {
    let snapshot = state.metrics.snapshot();

    if query.format.as_deref() == Some("prometheus") {
        return (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            snapshot.to_prometheus(),
        )
            .into_response();
    }

    match snapshot.to_json() {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "store": state.store.name(),
    }))
}

pub fn router(metrics: Arc<MetricsCollector>, store: Arc<dyn VectorStore>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(AppState { metrics, store })
}

/// Serve until `shutdown` turns true or its sender is dropped.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Metrics endpoint listening");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
            info!("Metrics endpoint shutting down");
        })
        .await?;

    Ok(())
}
