//! WebSocket Connection Handler
//!
//! Handles individual WebSocket connections: registration, the identify
//! deadline, the inbound read loop and the outbound writer task.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use crate::application::services::Disposition;
use crate::domain::entities::{ConnectionSender, OutboundFrame};
use crate::domain::value_objects::ConnectionId;
use crate::shared::protocol::Envelope;
use crate::startup::AppState;

/// How long the writer gets to flush queued frames after the read loop ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let limits = &state.settings.websocket;
    ws.max_message_size(limits.max_message_size)
        .max_frame_size(limits.max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = ConnectionId::new();
    tracing::debug!(connection_id = %connection_id, "New WebSocket connection");

    // Split socket for concurrent read/write
    let (mut sink, mut stream) = socket.split();

    // Create channel for outgoing messages
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();
    state
        .sessions
        .register(connection_id, ConnectionSender::new(tx));

    // Spawn task to forward messages from channel to WebSocket
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                OutboundFrame::Text(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                OutboundFrame::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let auth_deadline = sleep(Duration::from_millis(state.settings.websocket.auth_timeout_ms));
    tokio::pin!(auth_deadline);
    let mut writer_done = false;

    // Main message loop
    loop {
        let authenticating = !state.sessions.is_authenticated(&connection_id);

        tokio::select! {
            _ = &mut auth_deadline, if authenticating => {
                tracing::info!(connection_id = %connection_id, "Identify deadline passed, closing connection");
                state.sessions.send_to(&connection_id, &Envelope::auth_error("auth_timeout"));
                break;
            }

            // Writer stops when the socket fails or the registry closed it
            _ = &mut writer => {
                writer_done = true;
                break;
            }

            // Handle incoming messages
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::trace!(connection_id = %connection_id, bytes = text.len(), "Frame received");
                        if state.dispatcher.dispatch(connection_id, text.as_str()).await == Disposition::Close {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!(connection_id = %connection_id, "Ignoring binary frame");
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection_id = %connection_id, "Connection closed");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong is handled automatically by axum
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup. Unregistering queues a close frame behind any pending replies.
    let connection = state.sessions.unregister(&connection_id);
    if !writer_done && timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }

    tracing::info!(
        connection_id = %connection_id,
        user_id = ?connection.and_then(|c| c.user_id).map(|u| u.to_string()),
        "Client disconnected"
    );
}
