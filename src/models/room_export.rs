use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Current state of a room held in memory
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RoomExportResponse {
    pub room: String,
    pub phase: String,
    pub members: u32,
    /// Exported project, as sent to new members
    pub project: serde_json::value::Value,
}
