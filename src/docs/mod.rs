use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Project store is reachable", body = ReadyResponse),
        (status = 503, description = "Project store is unavailable", body = ReadyResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Relay and host statistics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Current relay statistics", body = DiagnosticsResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Export the live project of a room
#[utoipa::path(
    get,
    path = "/api/v1/rooms/{room}/export",
    params(
        ("room" = String, Path, description = "Room name")
    ),
    responses(
        (status = 200, description = "Room project exported", body = RoomExportResponse),
        (status = 404, description = "Room is not loaded", body = ErrorResponse),
        (status = 409, description = "Room is still loading", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn room_export_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        room_export_doc,
    ),
    components(
        schemas(HealthResponse, ReadyResponse, DiagnosticsResponse, RoomExportResponse, ErrorResponse)
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
