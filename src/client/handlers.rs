//! Typed dispatch table for inbound server messages.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::shared::protocol::MessageType;

/// Inbound types forwarded to registered handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    GameStateUpdate,
    EnvImpactUpdate,
    TeamUpdate,
    RoomUpdate,
    SysError,
    Heartbeat,
}

impl InboundKind {
    pub fn from_message_type(kind: MessageType) -> Option<Self> {
        match kind {
            MessageType::GameStateUpdate => Some(Self::GameStateUpdate),
            MessageType::EnvImpactUpdate => Some(Self::EnvImpactUpdate),
            MessageType::TeamUpdate => Some(Self::TeamUpdate),
            MessageType::RoomUpdate => Some(Self::RoomUpdate),
            MessageType::SysError => Some(Self::SysError),
            MessageType::Heartbeat => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

pub type MessageHandler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default, Clone)]
pub struct HandlerTable {
    handlers: HashMap<InboundKind, Vec<MessageHandler>>,
}

impl HandlerTable {
    pub fn register(&mut self, kind: InboundKind, handler: MessageHandler) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Snapshot of the handlers for `kind`, in registration order.
    pub fn handlers_for(&self, kind: InboundKind) -> Vec<MessageHandler> {
        self.handlers.get(&kind).cloned().unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.values().all(Vec::is_empty)
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self.handlers.iter().map(|(k, v)| (k, v.len())).collect();
        f.debug_struct("HandlerTable").field("handlers", &counts).finish()
    }
}
