//! Action Dispatcher
//!
//! Routes typed inbound envelopes to the session registry, the room router,
//! or the external handlers, and turns handler results into targeted
//! broadcasts or error replies.

use std::sync::Arc;

use serde_json::{json, Value};

use super::room_router::RoomRouter;
use super::session_registry::SessionRegistry;
use crate::domain::services::{
    EnvironmentalImpactHandler, GameStateHandler, HandlerError, TeamActionHandler,
};
use crate::domain::value_objects::{ConnectionId, RoomId, UserId};
use crate::infrastructure::metrics;
use crate::shared::error::ProtocolError;
use crate::shared::protocol::{
    AuthPayload, EnvImpactPayload, Envelope, ErrorPayload, MessageType, RoomPayload,
};
use crate::shared::validation::{message_type, parse_envelope, payload_as};

/// What the connection loop should do after a frame was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Close,
}

/// Inbound message router
pub struct ActionDispatcher {
    sessions: Arc<SessionRegistry>,
    rooms: Arc<RoomRouter>,
    game: Arc<dyn GameStateHandler>,
    environment: Arc<dyn EnvironmentalImpactHandler>,
    teams: Arc<dyn TeamActionHandler>,
}

impl ActionDispatcher {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        game: Arc<dyn GameStateHandler>,
        environment: Arc<dyn EnvironmentalImpactHandler>,
        teams: Arc<dyn TeamActionHandler>,
    ) -> Self {
        let rooms = sessions.router().clone();
        Self {
            sessions,
            rooms,
            game,
            environment,
            teams,
        }
    }

    /// Handle one text frame from `id`.
    ///
    /// Malformed or unknown messages are logged and dropped. Any well-formed
    /// message counts as a liveness signal.
    pub async fn dispatch(&self, id: ConnectionId, text: &str) -> Disposition {
        let envelope = match parse_envelope(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(connection_id = %id, error = %e, "Dropping malformed message");
                return Disposition::Continue;
            }
        };

        self.sessions.touch(&id);

        let kind = match message_type(&envelope) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Ignoring message");
                return Disposition::Continue;
            }
        };
        metrics::record_message("inbound", kind.as_str());

        let user_id = self.sessions.user_of(&id);
        if kind.requires_authentication() && user_id.is_none() {
            tracing::debug!(connection_id = %id, message_type = %kind, "Rejected unauthenticated message");
            self.reply(&id, &unauthenticated());
            return Disposition::Continue;
        }

        match (kind, user_id) {
            (MessageType::Auth, None) => self.handle_auth(id, &envelope).await,
            (MessageType::Auth, Some(user_id)) => {
                tracing::debug!(connection_id = %id, user_id = %user_id, "Ignoring AUTH on authenticated connection");
                Disposition::Continue
            }
            (MessageType::GameAction, Some(user_id)) => {
                self.handle_game_action(id, &user_id, envelope).await;
                Disposition::Continue
            }
            (MessageType::EnvAction, Some(user_id)) => {
                self.handle_env_action(id, &user_id, envelope).await;
                Disposition::Continue
            }
            (MessageType::TeamAction, Some(user_id)) => {
                self.handle_team_action(id, &user_id, envelope).await;
                Disposition::Continue
            }
            (MessageType::JoinRoom, Some(_)) => {
                self.handle_room(id, &envelope, true);
                Disposition::Continue
            }
            (MessageType::LeaveRoom, Some(_)) => {
                self.handle_room(id, &envelope, false);
                Disposition::Continue
            }
            // Covered by the authentication guard above.
            (
                MessageType::GameAction
                | MessageType::EnvAction
                | MessageType::TeamAction
                | MessageType::JoinRoom
                | MessageType::LeaveRoom,
                None,
            ) => Disposition::Continue,
            (MessageType::SysPong | MessageType::HeartbeatAck, _) => {
                tracing::trace!(connection_id = %id, "Liveness reply");
                Disposition::Continue
            }
            (MessageType::SysError, _) => self.handle_client_error(id, &envelope),
            (
                MessageType::AuthSuccess
                | MessageType::AuthError
                | MessageType::GameStateUpdate
                | MessageType::EnvImpactUpdate
                | MessageType::TeamUpdate
                | MessageType::RoomUpdate
                | MessageType::SysPing
                | MessageType::Heartbeat
                | MessageType::ReconnectRequest,
                _,
            ) => {
                tracing::debug!(connection_id = %id, message_type = %kind, "Ignoring server-bound type from client");
                Disposition::Continue
            }
        }
    }

    async fn handle_auth(&self, id: ConnectionId, envelope: &Envelope) -> Disposition {
        let token = match payload_as::<AuthPayload>(envelope) {
            Ok(payload) => payload.token,
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Invalid AUTH payload");
                self.reply(&id, &Envelope::auth_error("missing_token"));
                return Disposition::Close;
            }
        };

        match self.sessions.authenticate(id, &token).await {
            Ok(user_id) => {
                self.reply(&id, &Envelope::bare(MessageType::AuthSuccess));
                self.send_initial_state(id, &user_id).await;
                Disposition::Continue
            }
            Err(e) => {
                tracing::info!(connection_id = %id, error = %e, "Authentication failed");
                metrics::record_handler_failure("identity");
                self.reply(&id, &Envelope::auth_error(e.reason()));
                Disposition::Close
            }
        }
    }

    /// Team membership and `GAME_STATE_UPDATE` for a fresh session.
    async fn send_initial_state(&self, id: ConnectionId, user_id: &UserId) {
        match self.game.player_state(user_id).await {
            Ok(player) => {
                if let Some(team_id) = player.team_id {
                    if let Err(e) = self.sessions.set_team(&id, team_id) {
                        tracing::debug!(connection_id = %id, error = %e, "Could not assign team");
                    }
                }
                self.reply(&id, &state_envelope(MessageType::GameStateUpdate, player.state));
            }
            Err(e) => self.handler_failed(id, "game", e),
        }
    }

    async fn handle_game_action(&self, id: ConnectionId, user_id: &UserId, envelope: Envelope) {
        let payload = envelope.payload.unwrap_or_else(|| json!({}));
        match self.game.process(user_id, payload).await {
            Ok(outcome) => {
                let update = state_envelope(MessageType::GameStateUpdate, outcome.new_state);
                let delivered: usize = outcome
                    .affected_users
                    .iter()
                    .map(|affected| self.sessions.send_to_user(affected, &update))
                    .sum();
                tracing::debug!(connection_id = %id, user_id = %user_id, delivered = delivered, "Game action applied");
            }
            Err(e) => self.handler_failed(id, "game", e),
        }
    }

    async fn handle_env_action(&self, id: ConnectionId, user_id: &UserId, envelope: Envelope) {
        let payload = envelope.payload.unwrap_or_else(|| json!({}));
        match self.environment.track(user_id, payload).await {
            Ok(impact) => {
                let update = EnvImpactPayload {
                    user_id: user_id.to_string(),
                    impact,
                };
                let envelope = match Envelope::with_payload(MessageType::EnvImpactUpdate, &update) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        tracing::error!(connection_id = %id, error = %e, "Failed to encode impact update");
                        return;
                    }
                };
                let rooms = self.rooms.rooms_of_user(user_id);
                let delivered = self.rooms.broadcast_to_rooms(&rooms, &envelope);
                tracing::debug!(connection_id = %id, user_id = %user_id, rooms = rooms.len(), delivered = delivered, "Environmental action tracked");
            }
            Err(e) => self.handler_failed(id, "environment", e),
        }
    }

    async fn handle_team_action(&self, id: ConnectionId, user_id: &UserId, envelope: Envelope) {
        let payload = envelope.payload.unwrap_or_else(|| json!({}));
        match self.teams.process(user_id, payload).await {
            Ok(outcome) => {
                let Some(team_id) = outcome.team_id else {
                    tracing::debug!(connection_id = %id, user_id = %user_id, "Team action produced no team");
                    return;
                };
                if let Err(e) = self.sessions.set_team(&id, team_id.clone()) {
                    tracing::debug!(connection_id = %id, error = %e, "Could not assign team");
                }
                let update = state_envelope(MessageType::TeamUpdate, outcome.team_state);
                let delivered = self.rooms.broadcast_to_team(&team_id, &update);
                tracing::debug!(connection_id = %id, team_id = %team_id, delivered = delivered, "Team action applied");
            }
            Err(e) => self.handler_failed(id, "team", e),
        }
    }

    fn handle_room(&self, id: ConnectionId, envelope: &Envelope, join: bool) {
        let room_id = match payload_as::<RoomPayload>(envelope) {
            Ok(payload) => RoomId::new(payload.room_id),
            Err(e) => {
                self.reject(id, e);
                return;
            }
        };

        let result = if join {
            self.rooms.join(id, room_id)
        } else {
            self.rooms.leave(&id, &room_id)
        };
        if let Err(e) = result {
            tracing::debug!(connection_id = %id, error = %e, "Room operation rejected");
            self.reply(&id, &unauthenticated());
        }
    }

    fn handle_client_error(&self, id: ConnectionId, envelope: &Envelope) -> Disposition {
        tracing::debug!(connection_id = %id, payload = %envelope.payload_or_null(), "Client reported an error");
        match self.sessions.record_client_error(&id) {
            Some(true) => {
                tracing::warn!(connection_id = %id, "Client error threshold reached, closing connection");
                Disposition::Close
            }
            _ => Disposition::Continue,
        }
    }

    /// Report a handler failure to the originating connection only.
    fn handler_failed(&self, id: ConnectionId, handler: &str, error: HandlerError) {
        tracing::warn!(connection_id = %id, handler = handler, error = %error, "Handler failed");
        metrics::record_handler_failure(handler);
        self.reply(&id, &Envelope::sys_error(error.client_message()));
    }

    fn reject(&self, id: ConnectionId, error: ProtocolError) {
        tracing::debug!(connection_id = %id, error = %error, "Rejected message payload");
        self.reply(&id, &Envelope::sys_error(error.to_string()));
    }

    fn reply(&self, id: &ConnectionId, envelope: &Envelope) {
        if !self.sessions.send_to(id, envelope) {
            tracing::debug!(connection_id = %id, message_type = %envelope.kind, "Reply dropped, connection gone");
        }
    }
}

/// Wrap a handler-supplied state so the payload is always an object.
///
/// Null becomes `{}`; any other non-object value is nested under `state`.
fn state_envelope(kind: MessageType, state: Value) -> Envelope {
    let payload = match state {
        Value::Object(map) => Value::Object(map),
        Value::Null => json!({}),
        other => {
            tracing::warn!(message_type = %kind.as_str(), "Handler returned a non-object state, wrapping it");
            json!({ "state": other })
        }
    };
    Envelope::new(kind, payload)
}

fn unauthenticated() -> Envelope {
    let payload = ErrorPayload {
        message: "unauthenticated".into(),
        reason: Some("unauthenticated".into()),
    };
    Envelope::with_payload(MessageType::SysError, &payload)
        .unwrap_or_else(|_| Envelope::sys_error("unauthenticated"))
}
