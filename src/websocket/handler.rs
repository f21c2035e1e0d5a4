use std::sync::Arc;
use axum::{
    extract::{State, ws::{Message, WebSocket, WebSocketUpgrade}},
    response::Response,
};
use tracing::{debug, info, error};
use futures_util::{StreamExt, SinkExt};

use crate::AppState;
use crate::models::ReceivedMessage;
use crate::websocket::msg_mutation_handler::handle_mutation_message;
use crate::websocket::msg_subscribe_handler::handle_subscribe_message;

/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    info!("New WebSocket connection attempt");
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let rooms = app_state.rooms.clone();
    let (session, mut outbox) = rooms.connect().await;
    info!("WebSocket connection established with session_id: {}", session);

    // Split the socket into sender and receiver
    let (mut sender, mut receiver) = socket.split();

    // Forward everything queued for this session to the client
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = outbox.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Process frames from the client one at a time, in arrival order
    let recv_rooms = rooms.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            let msg = match frame {
                Ok(Message::Text(msg)) => msg,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!("WebSocket error for session {}: {}", session, e);
                    break;
                }
            };

            // Parse the incoming message as JSON
            let json_msg: ReceivedMessage = match serde_json::from_str(&msg) {
                Ok(json_msg) => json_msg,
                Err(e) => {
                    error!("Failed to parse message from session {}: {}", session, e);
                    continue;
                }
            };

            match json_msg.into_mutation() {
                Ok(mutation) => handle_mutation_message(&recv_rooms, session, mutation, msg).await,
                Err(subscribe_msg) => handle_subscribe_message(&recv_rooms, session, &subscribe_msg).await,
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    rooms.disconnect(session).await;
    info!("WebSocket connection terminated for session_id: {}", session);
}
