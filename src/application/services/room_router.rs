//! Room Router
//!
//! Owns room and team membership and performs targeted broadcast.
//!
//! All membership state sits behind one mutex so that join, leave, detach and
//! the heartbeat sweep's evictions observe a consistent snapshot. Broadcasts
//! collect their recipients under the lock and send after releasing it.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::domain::entities::{ConnectionSender, Room};
use crate::domain::value_objects::{ConnectionId, RoomId, TeamId, UserId};
use crate::infrastructure::metrics;
use crate::shared::protocol::{Envelope, MessageType, RoomAction, RoomUpdatePayload};

/// Room router errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    #[error("Connection is not authenticated")]
    NotAuthenticated,

    #[error("Unknown connection")]
    UnknownConnection,
}

/// Authenticated connection that may receive broadcasts.
#[derive(Debug, Clone)]
struct Recipient {
    user_id: UserId,
    sender: ConnectionSender,
}

#[derive(Debug, Default)]
struct Membership {
    attached: HashMap<ConnectionId, Recipient>,
    rooms: HashMap<RoomId, Room>,
    teams: HashMap<TeamId, HashSet<ConnectionId>>,
    joined: HashMap<ConnectionId, HashSet<RoomId>>,
    team_of: HashMap<ConnectionId, TeamId>,
}

impl Membership {
    /// Remove `id` from `room_id`, deleting the room if it empties.
    /// Returns the remaining members' senders, or `None` if `id` was not a member.
    fn remove_from_room(&mut self, id: &ConnectionId, room_id: &RoomId) -> Option<Vec<ConnectionSender>> {
        let room = self.rooms.get_mut(room_id)?;
        if !room.remove(id) {
            return None;
        }

        let members: Vec<ConnectionId> = room.members().copied().collect();
        if room.is_empty() {
            tracing::debug!(room_id = %room.id, "Room emptied, deleting");
            self.rooms.remove(room_id);
        }

        if let Some(rooms) = self.joined.get_mut(id) {
            rooms.remove(room_id);
        }

        Some(self.senders(members.iter()))
    }

    fn remove_from_team(&mut self, id: &ConnectionId) {
        if let Some(team_id) = self.team_of.remove(id) {
            if let Some(members) = self.teams.get_mut(&team_id) {
                members.remove(id);
                if members.is_empty() {
                    self.teams.remove(&team_id);
                }
            }
        }
    }

    fn senders<'a>(&self, ids: impl Iterator<Item = &'a ConnectionId>) -> Vec<ConnectionSender> {
        ids.filter_map(|id| self.attached.get(id))
            .map(|recipient| recipient.sender.clone())
            .collect()
    }
}

/// Room and team membership with targeted broadcast.
#[derive(Debug, Default)]
pub struct RoomRouter {
    inner: Mutex<Membership>,
}

impl RoomRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an authenticated connection eligible for membership and broadcast.
    pub fn attach(&self, id: ConnectionId, user_id: UserId, sender: ConnectionSender) {
        self.inner
            .lock()
            .attached
            .insert(id, Recipient { user_id, sender });
    }

    /// Remove a connection from every room and team it belonged to.
    ///
    /// Remaining members of each room receive `ROOM_UPDATE{LEAVE}`. Returns
    /// the rooms the connection was removed from.
    pub fn detach(&self, id: &ConnectionId) -> Vec<RoomId> {
        let (user_id, notices, room_count) = {
            let mut inner = self.inner.lock();
            let Some(recipient) = inner.attached.remove(id) else {
                return Vec::new();
            };

            let rooms: Vec<RoomId> = inner
                .joined
                .remove(id)
                .map(|rooms| rooms.into_iter().collect())
                .unwrap_or_default();

            let notices: Vec<(RoomId, Vec<ConnectionSender>)> = rooms
                .into_iter()
                .filter_map(|room_id| {
                    inner
                        .remove_from_room(id, &room_id)
                        .map(|remaining| (room_id, remaining))
                })
                .collect();

            inner.remove_from_team(id);
            (recipient.user_id, notices, inner.rooms.len())
        };

        metrics::set_rooms_active(room_count);

        let mut left = Vec::with_capacity(notices.len());
        for (room_id, remaining) in notices {
            deliver(&remaining, &room_update(RoomAction::Leave, &room_id, &user_id));
            left.push(room_id);
        }

        if !left.is_empty() {
            tracing::debug!(connection_id = %id, user_id = %user_id, rooms = left.len(), "Connection removed from rooms");
        }
        left
    }

    /// Add a connection to a room, creating the room if absent.
    ///
    /// Idempotent: joining a room twice changes nothing and broadcasts
    /// nothing. On a new join the room's other members receive
    /// `ROOM_UPDATE{JOIN}`. Returns whether the connection was newly added.
    pub fn join(&self, id: ConnectionId, room_id: RoomId) -> Result<bool, RouterError> {
        let (user_id, others, size, room_count) = {
            let mut inner = self.inner.lock();
            let user_id = inner
                .attached
                .get(&id)
                .map(|recipient| recipient.user_id.clone())
                .ok_or(RouterError::NotAuthenticated)?;

            let room = inner
                .rooms
                .entry(room_id.clone())
                .or_insert_with(|| Room::new(room_id.clone()));
            if room.contains(&id) {
                return Ok(false);
            }
            room.add(id);
            let other_ids: Vec<ConnectionId> =
                room.members().filter(|member| **member != id).copied().collect();
            let size = room.len();

            inner.joined.entry(id).or_default().insert(room_id.clone());
            let others = inner.senders(other_ids.iter());
            (user_id, others, size, inner.rooms.len())
        };

        metrics::set_rooms_active(room_count);
        deliver(&others, &room_update(RoomAction::Join, &room_id, &user_id));

        tracing::debug!(connection_id = %id, room_id = %room_id, user_id = %user_id, members = size, "Joined room");
        Ok(true)
    }

    /// Remove a connection from a room.
    ///
    /// An emptied room is deleted. Remaining members receive
    /// `ROOM_UPDATE{LEAVE}`. Returns whether the connection was a member.
    pub fn leave(&self, id: &ConnectionId, room_id: &RoomId) -> Result<bool, RouterError> {
        let (user_id, remaining, room_count) = {
            let mut inner = self.inner.lock();
            let user_id = inner
                .attached
                .get(id)
                .map(|recipient| recipient.user_id.clone())
                .ok_or(RouterError::NotAuthenticated)?;

            let Some(remaining) = inner.remove_from_room(id, room_id) else {
                return Ok(false);
            };
            (user_id, remaining, inner.rooms.len())
        };

        metrics::set_rooms_active(room_count);
        deliver(&remaining, &room_update(RoomAction::Leave, room_id, &user_id));

        tracing::debug!(connection_id = %id, room_id = %room_id, user_id = %user_id, "Left room");
        Ok(true)
    }

    /// Place a connection in a team, leaving any previous team.
    pub fn assign_team(&self, id: ConnectionId, team_id: TeamId) -> Result<(), RouterError> {
        let mut inner = self.inner.lock();
        if !inner.attached.contains_key(&id) {
            return Err(RouterError::UnknownConnection);
        }
        if inner.team_of.get(&id) == Some(&team_id) {
            return Ok(());
        }

        inner.remove_from_team(&id);
        inner.teams.entry(team_id.clone()).or_default().insert(id);
        inner.team_of.insert(id, team_id);
        Ok(())
    }

    /// Send to every member of a room. Returns the number of deliveries.
    pub fn broadcast_to_room(&self, room_id: &RoomId, envelope: &Envelope) -> usize {
        let recipients = {
            let inner = self.inner.lock();
            match inner.rooms.get(room_id) {
                Some(room) => inner.senders(room.members()),
                None => return 0,
            }
        };
        deliver(&recipients, envelope)
    }

    /// Send once to every connection that is a member of any of `room_ids`.
    pub fn broadcast_to_rooms(&self, room_ids: &[RoomId], envelope: &Envelope) -> usize {
        let recipients = {
            let inner = self.inner.lock();
            let ids: HashSet<ConnectionId> = room_ids
                .iter()
                .filter_map(|room_id| inner.rooms.get(room_id))
                .flat_map(|room| room.members().copied())
                .collect();
            inner.senders(ids.iter())
        };
        deliver(&recipients, envelope)
    }

    /// Send to every member of a team. Returns the number of deliveries.
    pub fn broadcast_to_team(&self, team_id: &TeamId, envelope: &Envelope) -> usize {
        let recipients = {
            let inner = self.inner.lock();
            match inner.teams.get(team_id) {
                Some(members) => inner.senders(members.iter()),
                None => return 0,
            }
        };
        deliver(&recipients, envelope)
    }

    /// Rooms a connection has joined.
    pub fn rooms_of(&self, id: &ConnectionId) -> Vec<RoomId> {
        self.inner
            .lock()
            .joined
            .get(id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Rooms joined by any connection of a user.
    pub fn rooms_of_user(&self, user_id: &UserId) -> Vec<RoomId> {
        let inner = self.inner.lock();
        let rooms: HashSet<RoomId> = inner
            .attached
            .iter()
            .filter(|(_, recipient)| &recipient.user_id == user_id)
            .filter_map(|(id, _)| inner.joined.get(id))
            .flat_map(|rooms| rooms.iter().cloned())
            .collect();
        rooms.into_iter().collect()
    }

    pub fn team_of(&self, id: &ConnectionId) -> Option<TeamId> {
        self.inner.lock().team_of.get(id).cloned()
    }

    pub fn room_members(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        self.inner
            .lock()
            .rooms
            .get(room_id)
            .map(|room| room.members().copied().collect())
            .unwrap_or_default()
    }

    pub fn team_members(&self, team_id: &TeamId) -> Vec<ConnectionId> {
        self.inner
            .lock()
            .teams
            .get(team_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains_room(&self, room_id: &RoomId) -> bool {
        self.inner.lock().rooms.contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.inner.lock().rooms.len()
    }

    pub fn is_attached(&self, id: &ConnectionId) -> bool {
        self.inner.lock().attached.contains_key(id)
    }
}

fn room_update(action: RoomAction, room_id: &RoomId, user_id: &UserId) -> Envelope {
    let payload = RoomUpdatePayload {
        action,
        room_id: room_id.to_string(),
        user_id: user_id.to_string(),
    };
    Envelope::with_payload(MessageType::RoomUpdate, &payload)
        .unwrap_or_else(|_| Envelope::bare(MessageType::RoomUpdate))
}

/// Serialize once and queue on every open recipient.
///
/// Each send is independent: a recipient whose writer is gone is skipped.
fn deliver(recipients: &[ConnectionSender], envelope: &Envelope) -> usize {
    if recipients.is_empty() {
        return 0;
    }
    let text = match envelope.to_text() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, message_type = %envelope.kind, "Failed to serialize broadcast");
            return 0;
        }
    };

    let delivered = recipients
        .iter()
        .filter(|sender| !sender.is_closed())
        .filter(|sender| sender.send_text(text.clone()))
        .count();
    metrics::MESSAGES_TOTAL
        .with_label_values(&["outbound", envelope.kind.as_str()])
        .inc_by(delivered as u64);
    delivered
}
