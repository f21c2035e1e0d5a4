use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use tracing::{debug, warn};

use crate::models::{HealthResponse, ReadyResponse};
use crate::AppState;

/// Room key used to probe the store. Never written.
const READY_PROBE_ROOM: &str = "__ready__";

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
    })
}

/// Readiness check endpoint. Ready once the project store answers reads.
pub async fn ready_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadyResponse>) {
    debug!("Readiness check requested");
    let timestamp = Utc::now().to_rfc3339();
    match state.rooms.store().get(READY_PROBE_ROOM).await {
        Ok(_) => (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ok".to_string(),
                message: "Service is ready".to_string(),
                store: true,
                timestamp,
            }),
        ),
        Err(e) => {
            warn!("Project store is not ready: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    status: "unavailable".to_string(),
                    message: format!("Project store unavailable: {}", e),
                    store: false,
                    timestamp,
                }),
            )
        }
    }
}
