//! Server-side connection entity.
//!
//! A `Connection` is created on transport accept, promoted to authenticated
//! after the handshake, and destroyed on transport close or heartbeat
//! timeout.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::domain::value_objects::{ConnectionId, ErrorWindow, TeamId, UserId};
use crate::shared::protocol::Envelope;

/// Frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close,
}

/// Write half of a connection, as seen by the rest of the server.
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl ConnectionSender {
    pub fn new(tx: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self { tx }
    }

    /// Queue an envelope. Returns false if the writer is gone.
    pub fn send(&self, envelope: &Envelope) -> bool {
        match envelope.to_text() {
            Ok(text) => self.send_text(text),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize envelope");
                false
            }
        }
    }

    /// Queue an already-serialized frame.
    pub fn send_text(&self, text: String) -> bool {
        self.tx.send(OutboundFrame::Text(text)).is_ok()
    }

    /// Ask the writer to close the socket.
    pub fn close(&self) {
        let _ = self.tx.send(OutboundFrame::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Connection table entry.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    /// Set once the handshake succeeds.
    pub user_id: Option<UserId>,
    pub team_id: Option<TeamId>,
    pub last_pong: Instant,
    pub connected_at: DateTime<Utc>,
    pub sender: ConnectionSender,
    /// Error reports received from the client.
    pub client_errors: ErrorWindow,
}

impl Connection {
    pub fn new(id: ConnectionId, sender: ConnectionSender, client_errors: ErrorWindow) -> Self {
        Self {
            id,
            user_id: None,
            team_id: None,
            last_pong: Instant::now(),
            connected_at: Utc::now(),
            sender,
            client_errors,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Promote to authenticated and start the liveness clock.
    pub fn promote(&mut self, user_id: UserId, now: Instant) {
        self.user_id = Some(user_id);
        self.last_pong = now;
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_pong = now;
    }

    /// Wall-clock time since the transport was accepted.
    pub fn session_duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.connected_at)
    }

    /// Whether the connection has been silent for longer than `timeout`.
    pub fn is_stale(&self, now: Instant, timeout: std::time::Duration) -> bool {
        now.saturating_duration_since(self.last_pong) > timeout
    }
}
