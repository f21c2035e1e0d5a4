use crate::{models::{ErrorResponse, RoomExportResponse}, rooms::RelayError, AppState};
use axum::{extract::{Path, State}, http::StatusCode, Json};
use std::sync::Arc;
use tracing::error;

/// Export the live project of a room held in memory
pub async fn room_export(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> Result<(StatusCode, Json<RoomExportResponse>), (StatusCode, Json<ErrorResponse>)> {
    let snapshot = match state.rooms.export_room(&room).await {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            return Err(ErrorResponse::reply(
                StatusCode::NOT_FOUND,
                format!("Room '{}' is not loaded", room),
            ));
        }
        Err(RelayError::NotReady(_)) => {
            return Err(ErrorResponse::reply(
                StatusCode::CONFLICT,
                format!("Room '{}' is still loading", room),
            ));
        }
        Err(e) => {
            error!("Failed to export room '{}': {}", room, e);
            return Err(ErrorResponse::reply(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    let project = match serde_json::from_str(snapshot.as_str()) {
        Ok(value) => value,
        Err(e) => {
            error!("Exported project of room '{}' is not JSON: {}", room, e);
            return Err(ErrorResponse::reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialize project for room '{}': {}", room, e),
            ));
        }
    };

    let phase = state
        .rooms
        .phase_of(&room)
        .await
        .map(|phase| phase.to_string())
        .unwrap_or_else(|| "unloaded".to_string());
    let members = state.rooms.membership().count(&room).await as u32;

    Ok((
        StatusCode::OK,
        Json(RoomExportResponse {
            room,
            phase,
            members,
            project,
        }),
    ))
}
