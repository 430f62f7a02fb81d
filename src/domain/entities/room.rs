//! Room entity.
//!
//! A room exists only while it has members; the router deletes it as soon as
//! its member set becomes empty.

use std::collections::HashSet;

use crate::domain::value_objects::{ConnectionId, RoomId};

#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    members: HashSet<ConnectionId>,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            members: HashSet::new(),
        }
    }

    /// Add a member. Returns false if it was already present.
    pub fn add(&mut self, connection_id: ConnectionId) -> bool {
        self.members.insert(connection_id)
    }

    /// Remove a member. Returns false if it was not present.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> bool {
        self.members.remove(connection_id)
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.members.contains(connection_id)
    }

    pub fn members(&self) -> impl Iterator<Item = &ConnectionId> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
