use tracing::{warn, error};

use crate::models::{Mutation, SendMessage};
use crate::rooms::RelayError;
use crate::services::RoomService;
use crate::ws::membership::SessionId;

/// Handle a drawing event. `frame` is the raw text it arrived as.
pub async fn handle_mutation_message(rooms: &RoomService, session: SessionId, mutation: Mutation, frame: String) {
    let event = mutation.event_name();
    match rooms.submit_frame(session, mutation, frame).await {
        Ok(()) => {}
        Err(RelayError::NotReady(room)) => {
            warn!("Dropped {} from session {}: room '{}' is not ready", event, session, room);
            rooms.send(session, &SendMessage::ProjectLoadError).await;
        }
        Err(e) => {
            error!("Failed to apply {} from session {}: {}", event, session, e);
        }
    }
}
