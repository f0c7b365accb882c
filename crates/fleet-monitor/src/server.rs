//! Monitor HTTP + push surface.
//!
//! Status queries always answer with the best available snapshot, even
//! under full outage. Observers connect on `/ws`, receive a full
//! `health-status` snapshot, and then every event as it happens.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::debug;

use fleet_core::epoch_ms;

use crate::correlate::MetricsMirror;
use crate::events::EventHub;
use crate::health::HealthLedger;
use crate::watcher::Watcher;

/// Shared state for monitor handlers.
#[derive(Clone)]
pub struct MonitorState {
    pub ledger: HealthLedger,
    pub mirror: MetricsMirror,
    pub hub: EventHub,
    pub watcher: Arc<Watcher>,
}

/// Build the monitor's axum router.
pub fn build_router(state: MonitorState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/status/{service_type}", get(status_for_class))
        .route("/api/check", post(trigger_check))
        .route("/api/metrics", get(metrics))
        .route("/ws", any(ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "fleet-monitor",
        "timestamp": epoch_ms(),
    }))
}

async fn status(State(state): State<MonitorState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "summary": state.ledger.summary(),
        "services": state.ledger.by_class(),
        "requestMetrics": state.mirror.snapshot(),
        "timestamp": epoch_ms(),
    }))
}

async fn status_for_class(
    State(state): State<MonitorState>,
    Path(service_type): Path<String>,
) -> Response {
    match state.ledger.class(&service_type) {
        Some(services) => Json(serde_json::json!({
            "serviceType": service_type,
            "services": services,
            "timestamp": epoch_ms(),
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Service type not found" })),
        )
            .into_response(),
    }
}

async fn trigger_check(State(state): State<MonitorState>) -> impl IntoResponse {
    state.watcher.run_cycle().await;

    Json(serde_json::json!({
        "message": "Health check completed",
        "status": state.ledger.by_class(),
        "requestMetrics": state.mirror.snapshot(),
        "timestamp": epoch_ms(),
    }))
}

async fn metrics(State(state): State<MonitorState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "metrics": state.mirror.snapshot(),
        "timestamp": epoch_ms(),
    }))
}

async fn ws_upgrade(
    State(state): State<MonitorState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| observer_session(socket, state))
}

/// One connected observer: snapshot first, then the live stream.
async fn observer_session(mut socket: WebSocket, state: MonitorState) {
    let snapshot = serde_json::json!({
        "event": "health-status",
        "summary": state.ledger.summary(),
        "services": state.ledger.by_class(),
        "requestMetrics": state.mirror.snapshot(),
        "timestamp": epoch_ms(),
    });
    if socket
        .send(Message::Text(snapshot.to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    let mut events = state.hub.subscribe();
    debug!(observers = state.hub.observer_count(), "observer connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(text) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    // A lagging observer missed events; keep streaming.
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
        }
    }

    debug!("observer disconnected");
}
