//! Notifications published by the connection manager.

use serde_json::Value;

use crate::domain::value_objects::ConnectionState;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    StateChanged(ConnectionState),
    /// The retry budget is spent. Fired once per exhaustion.
    MaxReconnectAttempts { attempts: u32 },
    /// A `SYS_ERROR` arrived on a connected link.
    ServerError { count: u32, payload: Value },
}
