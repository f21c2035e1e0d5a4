use tracing::{info, error};

use crate::models::{SendMessage, SubscribeMessage};
use crate::rooms::RelayError;
use crate::services::RoomService;
use crate::ws::membership::SessionId;

/// Handle SubscribeMessage
pub async fn handle_subscribe_message(rooms: &RoomService, session: SessionId, subscribe_msg: &SubscribeMessage) {
    info!("Subscribe message received from session {} for room '{}'", session, subscribe_msg.room);

    match rooms.subscribe(session, &subscribe_msg.room).await {
        Ok(()) => {}
        Err(RelayError::InvalidRoom) => {
            error!("Session {} sent a subscribe without a room", session);
        }
        Err(e) => {
            error!("Subscribe of session {} failed: {}", session, e);
            rooms.send(session, &SendMessage::ProjectLoadError).await;
        }
    }
}
