//! Registry HTTP surface.
//!
//! JSON endpoints under `/api/registry/*` plus the registry's own
//! `/health`. Request bodies use optional fields so a missing field maps
//! to a 400 with a message rather than a deserialization rejection.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use fleet_core::{epoch_ms, Registration, ServiceFilter};

use crate::directory::ServiceDirectory;
use crate::error::RegistryError;

/// Shared state for registry handlers.
#[derive(Clone)]
pub struct RegistryState {
    pub directory: ServiceDirectory,
}

/// Build the registry's axum router.
pub fn build_router(directory: ServiceDirectory) -> Router {
    let state = RegistryState { directory };

    Router::new()
        .route("/api/registry/register", post(register))
        .route("/api/registry/heartbeat", post(heartbeat))
        .route("/api/registry/deregister", post(deregister))
        .route("/api/registry/services", get(list_services))
        .route("/api/registry/services/{type}", get(list_services_by_type))
        .route("/api/registry/service/{service_id}", get(get_service))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> impl IntoResponse {
    (status, Json(ErrorBody { error: msg.into() }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody {
    service_id: Option<String>,
    service_type: Option<String>,
    url: Option<String>,
    name: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

async fn register(
    State(state): State<RegistryState>,
    Json(body): Json<RegisterBody>,
) -> impl IntoResponse {
    let reg = Registration {
        service_id: body.service_id.unwrap_or_default(),
        service_type: body.service_type.unwrap_or_default(),
        url: body.url.unwrap_or_default(),
        name: body.name.unwrap_or_default(),
        metadata: body.metadata,
    };

    match state.directory.register(reg) {
        Ok(service) => Json(serde_json::json!({
            "success": true,
            "message": "Service registered successfully",
            "service": service,
        }))
        .into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceIdBody {
    service_id: Option<String>,
}

async fn heartbeat(
    State(state): State<RegistryState>,
    Json(body): Json<ServiceIdBody>,
) -> impl IntoResponse {
    let Some(service_id) = body.service_id.filter(|id| !id.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "serviceId is required").into_response();
    };

    match state.directory.heartbeat(&service_id) {
        Ok(()) => Json(serde_json::json!({
            "success": true,
            "message": "Heartbeat received",
            "timestamp": epoch_ms(),
        }))
        .into_response(),
        Err(RegistryError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, "Service not found").into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn deregister(
    State(state): State<RegistryState>,
    Json(body): Json<ServiceIdBody>,
) -> impl IntoResponse {
    let Some(service_id) = body.service_id.filter(|id| !id.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "serviceId is required").into_response();
    };

    // Removing an unknown id still succeeds.
    state.directory.deregister(&service_id);
    Json(serde_json::json!({
        "success": true,
        "message": "Service deregistered successfully",
    }))
    .into_response()
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(rename = "type")]
    service_type: Option<String>,
    healthy: Option<bool>,
}

async fn list_services(
    State(state): State<RegistryState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let services = state.directory.list(&ServiceFilter {
        service_type: query.service_type,
        healthy: query.healthy,
    });

    Json(serde_json::json!({
        "services": services,
        "total": services.len(),
        "timestamp": epoch_ms(),
    }))
}

#[derive(Deserialize)]
struct HealthyQuery {
    healthy: Option<bool>,
}

async fn list_services_by_type(
    State(state): State<RegistryState>,
    Path(service_type): Path<String>,
    Query(query): Query<HealthyQuery>,
) -> impl IntoResponse {
    let services = state.directory.list(&ServiceFilter {
        service_type: Some(service_type.clone()),
        healthy: query.healthy,
    });

    Json(serde_json::json!({
        "services": services,
        "type": service_type,
        "total": services.len(),
        "timestamp": epoch_ms(),
    }))
}

async fn get_service(
    State(state): State<RegistryState>,
    Path(service_id): Path<String>,
) -> impl IntoResponse {
    match state.directory.get(&service_id) {
        Ok(record) => Json(record).into_response(),
        Err(_) => error_response(StatusCode::NOT_FOUND, "Service not found").into_response(),
    }
}

async fn health(State(state): State<RegistryState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "fleet-registry",
        "registeredServices": state.directory.len(),
        "timestamp": epoch_ms(),
    }))
}
