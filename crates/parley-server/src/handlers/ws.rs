//! WebSocket echo endpoint
//!
//! Every text or binary frame is sent back unchanged with its frame type.
//! Connections are independent; nothing is shared between them.

use crate::extractors::AllowedOrigin;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{sink::SinkExt, stream::StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub async fn handler(_origin: AllowedOrigin, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(handle_socket)
}

async fn handle_socket(socket: WebSocket) {
    let connection_id = Uuid::new_v4().to_string();
    info!(%connection_id, "New WebSocket connection");

    let (mut sender, mut receiver) = socket.split();

    while let Some(msg) = receiver.next().await {
        let reply = match msg {
            Ok(Message::Text(text)) => {
                debug!(%connection_id, len = text.len(), "Received text frame");
                Message::Text(text)
            }
            Ok(Message::Binary(data)) => {
                debug!(%connection_id, len = data.len(), "Received binary frame");
                Message::Binary(data)
            }
            // Answered by the transport
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            // Keep polling so the queued close reply is flushed; the stream
            // ends once the handshake completes
            Ok(Message::Close(_)) => continue,
            Err(e) => {
                warn!(%connection_id, "Failed to read message: {}", e);
                break;
            }
        };

        if let Err(e) = sender.send(reply).await {
            warn!(%connection_id, "Failed to write message: {}", e);
            break;
        }
    }

    info!(%connection_id, "WebSocket connection closed");
}
