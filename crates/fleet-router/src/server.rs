//! Router HTTP surface.
//!
//! One wildcard proxy route per the `/api/{class}/...` pattern plus the
//! router's own health, status, and metrics endpoints.

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};

use fleet_core::epoch_ms;

use crate::metrics::MetricsBook;
use crate::proxy::Dispatcher;
use crate::table::RouteTable;

/// Upper bound on proxied request bodies.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state for router handlers.
#[derive(Clone)]
pub struct RouterState {
    pub table: RouteTable,
    pub metrics: MetricsBook,
    pub dispatcher: Dispatcher,
}

/// Build the router's axum router.
pub fn build_router(state: RouterState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .route("/api/{class}/{*path}", any(dispatch))
        .with_state(state)
}

async fn dispatch(
    State(state): State<RouterState>,
    Path((class, path)): Path<(String, String)>,
    req: Request,
) -> Response {
    if !state.table.has_class(&class) {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": format!("Unknown service class: {class}"),
            })),
        )
            .into_response();
    }

    let method = req.method().clone();
    let query = req
        .uri()
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();
    let headers = req.headers().clone();

    let body = match axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(serde_json::json!({ "error": "Request body too large" })),
            )
                .into_response();
        }
    };

    let path_and_query = format!("/api/{class}/{path}{query}");
    state
        .dispatcher
        .dispatch(&class, method, &path_and_query, &headers, body)
        .await
}

async fn health(State(state): State<RouterState>) -> impl IntoResponse {
    let snapshot = state.table.snapshot();
    let mut services = serde_json::Map::new();
    for (class, entry) in &snapshot {
        let healthy = entry.targets.iter().filter(|t| t.healthy).count();
        services.insert(
            class.clone(),
            serde_json::json!({
                "total": entry.targets.len(),
                "healthy": healthy,
                "unhealthy": entry.targets.len() - healthy,
                "targets": entry.targets,
            }),
        );
    }

    Json(serde_json::json!({
        "status": "healthy",
        "service": "fleet-router",
        "services": services,
        "timestamp": epoch_ms(),
    }))
}

async fn status(State(state): State<RouterState>) -> impl IntoResponse {
    let snapshot = state.table.snapshot();
    let mut services = serde_json::Map::new();
    let mut round_robin = serde_json::Map::new();
    for (class, entry) in &snapshot {
        services.insert(class.clone(), serde_json::json!(entry.targets));
        round_robin.insert(class.clone(), serde_json::json!(entry.round_robin));
    }

    Json(serde_json::json!({
        "services": services,
        "roundRobin": round_robin,
        "metrics": state.metrics.snapshot(),
        "timestamp": epoch_ms(),
    }))
}

async fn metrics(State(state): State<RouterState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "metrics": state.metrics.snapshot(),
        "timestamp": epoch_ms(),
    }))
}
