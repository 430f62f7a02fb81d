//! Session Registry
//!
//! Authoritative connection table: maps each live link to its authenticated
//! identity and liveness timestamp, and evicts dead entries on each sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::time::Instant;

use super::room_router::{RoomRouter, RouterError};
use crate::config::HeartbeatSettings;
use crate::domain::entities::{Connection, ConnectionSender};
use crate::domain::services::{AuthError, IdentityVerifier};
use crate::domain::value_objects::{ConnectionId, ErrorWindow, TeamId, UserId};
use crate::infrastructure::metrics;
use crate::shared::protocol::{Envelope, MessageType};

/// Outcome of one liveness sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub pinged: usize,
    pub evicted: Vec<ConnectionId>,
}

/// Connection table
pub struct SessionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    router: Arc<RoomRouter>,
    verifier: Arc<dyn IdentityVerifier>,
    max_client_errors: u32,
    client_error_reset: Duration,
}

impl SessionRegistry {
    pub fn new(
        router: Arc<RoomRouter>,
        verifier: Arc<dyn IdentityVerifier>,
        heartbeat: &HeartbeatSettings,
    ) -> Self {
        Self {
            connections: DashMap::new(),
            router,
            verifier,
            max_client_errors: heartbeat.max_client_errors,
            client_error_reset: Duration::from_millis(heartbeat.client_error_reset_ms),
        }
    }

    pub fn router(&self) -> &Arc<RoomRouter> {
        &self.router
    }

    /// Create an unauthenticated entry for a freshly accepted link.
    pub fn register(&self, id: ConnectionId, sender: ConnectionSender) {
        let errors = ErrorWindow::new(self.max_client_errors, self.client_error_reset);
        self.connections.insert(id, Connection::new(id, sender, errors));
        self.publish_gauges();

        tracing::debug!(connection_id = %id, "Connection registered");
    }

    /// Verify `token` and promote the connection to authenticated.
    ///
    /// On failure the entry is left unauthenticated; the caller is expected
    /// to close the transport.
    pub async fn authenticate(&self, id: ConnectionId, token: &str) -> Result<UserId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        if !self.connections.contains_key(&id) {
            return Err(AuthError::ConnectionClosed);
        }

        // No map guard is held across the verifier call.
        let user_id = self.verifier.verify(token).await?;

        let sender = {
            let mut entry = self
                .connections
                .get_mut(&id)
                .ok_or(AuthError::ConnectionClosed)?;
            entry.promote(user_id.clone(), Instant::now());
            entry.sender.clone()
        };
        self.router.attach(id, user_id.clone(), sender);
        self.publish_gauges();

        tracing::info!(connection_id = %id, user_id = %user_id, "Connection authenticated");
        Ok(user_id)
    }

    /// Record a liveness signal. Returns false for unknown connections.
    pub fn touch(&self, id: &ConnectionId) -> bool {
        match self.connections.get_mut(id) {
            Some(mut entry) => {
                entry.touch(Instant::now());
                true
            }
            None => false,
        }
    }

    pub fn user_of(&self, id: &ConnectionId) -> Option<UserId> {
        self.connections.get(id).and_then(|entry| entry.user_id.clone())
    }

    pub fn team_of(&self, id: &ConnectionId) -> Option<TeamId> {
        self.connections.get(id).and_then(|entry| entry.team_id.clone())
    }

    pub fn is_authenticated(&self, id: &ConnectionId) -> bool {
        self.connections
            .get(id)
            .map(|entry| entry.is_authenticated())
            .unwrap_or(false)
    }

    /// Record the connection's team and move its team membership.
    pub fn set_team(&self, id: &ConnectionId, team_id: TeamId) -> Result<(), RouterError> {
        {
            let mut entry = self
                .connections
                .get_mut(id)
                .ok_or(RouterError::UnknownConnection)?;
            if !entry.is_authenticated() {
                return Err(RouterError::NotAuthenticated);
            }
            entry.team_id = Some(team_id.clone());
        }
        self.router.assign_team(*id, team_id)
    }

    /// Count one error report from the client.
    ///
    /// Returns whether the connection crossed its error threshold, or `None`
    /// for unknown connections.
    pub fn record_client_error(&self, id: &ConnectionId) -> Option<bool> {
        let mut entry = self.connections.get_mut(id)?;
        let now = Instant::now();
        let count = entry.client_errors.record(now);
        let exceeded = entry.client_errors.exceeded(now);

        tracing::debug!(connection_id = %id, count = count, "Client reported an error");
        Some(exceeded)
    }

    /// Authenticated connections belonging to a user.
    pub fn connections_for_user(&self, user_id: &UserId) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|entry| entry.user_id.as_ref() == Some(user_id))
            .map(|entry| entry.id)
            .collect()
    }

    /// Queue an envelope on one connection.
    pub fn send_to(&self, id: &ConnectionId, envelope: &Envelope) -> bool {
        let Some(sender) = self.connections.get(id).map(|entry| entry.sender.clone()) else {
            return false;
        };
        let sent = sender.send(envelope);
        if sent {
            metrics::record_message("outbound", &envelope.kind);
        }
        sent
    }

    /// Queue an envelope on every connection of a user. Returns deliveries.
    pub fn send_to_user(&self, user_id: &UserId, envelope: &Envelope) -> usize {
        self.connections_for_user(user_id)
            .iter()
            .filter(|id| self.send_to(id, envelope))
            .count()
    }

    /// Remove a connection and every membership record it owns.
    ///
    /// Asks the writer to close the socket. A second call for the same id
    /// returns `None` and has no effect.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Connection> {
        let (_, connection) = self.connections.remove(id)?;
        Some(self.release(connection))
    }

    /// Evict `id` only if it is still stale as of `now`.
    ///
    /// The check and the removal happen under the same shard lock, so a
    /// liveness signal recorded after the sweep's scan keeps the entry.
    pub(crate) fn evict_if_stale(&self, id: &ConnectionId, now: Instant, timeout: Duration) -> Option<Connection> {
        let (_, connection) = self
            .connections
            .remove_if(id, |_, entry| entry.is_stale(now, timeout))?;
        metrics::record_eviction();
        tracing::info!(connection_id = %id, "Evicted connection after heartbeat timeout");
        Some(self.release(connection))
    }

    fn release(&self, connection: Connection) -> Connection {
        connection.sender.close();
        self.router.detach(&connection.id);
        self.publish_gauges();

        tracing::info!(
            connection_id = %connection.id,
            user_id = ?connection.user_id.as_ref().map(|u| u.as_str()),
            session_secs = connection.session_duration(Utc::now()).num_seconds(),
            "Connection unregistered"
        );
        connection
    }

    /// One liveness pass over authenticated connections.
    ///
    /// Entries silent for longer than `timeout` are evicted; all others
    /// receive `SYS_PING`.
    pub fn sweep(&self, timeout: Duration) -> SweepReport {
        let now = Instant::now();
        let mut stale = Vec::new();
        let mut live = Vec::new();

        for entry in self.connections.iter().filter(|entry| entry.is_authenticated()) {
            if entry.is_stale(now, timeout) {
                stale.push(entry.id);
            } else {
                live.push(entry.sender.clone());
            }
        }

        let mut report = SweepReport::default();
        for id in stale {
            if self.evict_if_stale(&id, now, timeout).is_some() {
                report.evicted.push(id);
            }
        }

        let ping = Envelope::bare(MessageType::SysPing);
        report.pinged = live.iter().filter(|sender| sender.send(&ping)).count();
        metrics::MESSAGES_TOTAL
            .with_label_values(&["outbound", MessageType::SysPing.as_str()])
            .inc_by(report.pinged as u64);

        tracing::trace!(pinged = report.pinged, evicted = report.evicted.len(), "Heartbeat sweep");
        report
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn authenticated_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.is_authenticated())
            .count()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    fn publish_gauges(&self) {
        metrics::set_websocket_connections(self.connection_count(), self.authenticated_count());
    }
}
