//! Wire Protocol
//!
//! JSON envelope exchanged in both directions as text frames:
//! `{ "type": <string>, "payload"?: <object> }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Every message type understood on the wire, in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    // Client -> Server
    Auth,
    GameAction,
    EnvAction,
    TeamAction,
    JoinRoom,
    LeaveRoom,
    SysPong,
    HeartbeatAck,

    // Server -> Client
    AuthSuccess,
    AuthError,
    GameStateUpdate,
    EnvImpactUpdate,
    TeamUpdate,
    RoomUpdate,
    SysError,
    SysPing,
    Heartbeat,
    ReconnectRequest,
}

impl MessageType {
    /// Parse a wire type name. Legacy aliases map onto their canonical type.
    pub fn parse(s: &str) -> Option<Self> {
        let kind = match s {
            "AUTH" => Self::Auth,
            "GAME_ACTION" => Self::GameAction,
            "ENV_ACTION" => Self::EnvAction,
            "TEAM_ACTION" => Self::TeamAction,
            "JOIN_ROOM" => Self::JoinRoom,
            "LEAVE_ROOM" => Self::LeaveRoom,
            "SYS_PONG" => Self::SysPong,
            "HEARTBEAT_ACK" => Self::HeartbeatAck,
            "AUTH_SUCCESS" => Self::AuthSuccess,
            "AUTH_ERROR" => Self::AuthError,
            "GAME_STATE_UPDATE" | "GAME_STATE" => Self::GameStateUpdate,
            "ENV_IMPACT_UPDATE" | "ENVIRONMENTAL_IMPACT" => Self::EnvImpactUpdate,
            "TEAM_UPDATE" => Self::TeamUpdate,
            "ROOM_UPDATE" => Self::RoomUpdate,
            "SYS_ERROR" | "ERROR" => Self::SysError,
            "SYS_PING" => Self::SysPing,
            "HEARTBEAT" => Self::Heartbeat,
            "RECONNECT_REQUEST" => Self::ReconnectRequest,
            _ => return None,
        };
        Some(kind)
    }

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "AUTH",
            Self::GameAction => "GAME_ACTION",
            Self::EnvAction => "ENV_ACTION",
            Self::TeamAction => "TEAM_ACTION",
            Self::JoinRoom => "JOIN_ROOM",
            Self::LeaveRoom => "LEAVE_ROOM",
            Self::SysPong => "SYS_PONG",
            Self::HeartbeatAck => "HEARTBEAT_ACK",
            Self::AuthSuccess => "AUTH_SUCCESS",
            Self::AuthError => "AUTH_ERROR",
            Self::GameStateUpdate => "GAME_STATE_UPDATE",
            Self::EnvImpactUpdate => "ENV_IMPACT_UPDATE",
            Self::TeamUpdate => "TEAM_UPDATE",
            Self::RoomUpdate => "ROOM_UPDATE",
            Self::SysError => "SYS_ERROR",
            Self::SysPing => "SYS_PING",
            Self::Heartbeat => "HEARTBEAT",
            Self::ReconnectRequest => "RECONNECT_REQUEST",
        }
    }

    /// Types the server only accepts after the handshake completed.
    pub fn requires_authentication(&self) -> bool {
        matches!(
            self,
            Self::GameAction | Self::EnvAction | Self::TeamAction | Self::JoinRoom | Self::LeaveRoom
        )
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Message envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Envelope {
    /// Envelope without a payload.
    pub fn bare(kind: MessageType) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            payload: None,
        }
    }

    /// Envelope carrying an arbitrary JSON payload.
    pub fn new(kind: MessageType, payload: Value) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            payload: Some(payload),
        }
    }

    /// Envelope carrying a typed payload.
    pub fn with_payload<T: Serialize>(kind: MessageType, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(kind, serde_json::to_value(payload)?))
    }

    /// Recognized message type, if any.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::parse(&self.kind)
    }

    /// Payload or JSON `null` when absent.
    pub fn payload_or_null(&self) -> &Value {
        static NULL: Value = Value::Null;
        self.payload.as_ref().unwrap_or(&NULL)
    }

    /// Serialize to a text frame.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// `SYS_ERROR{message}` envelope.
    pub fn sys_error(message: impl Into<String>) -> Self {
        let payload = ErrorPayload {
            message: message.into(),
            reason: None,
        };
        Self::new(MessageType::SysError, payload.into_value())
    }

    /// `AUTH_ERROR{reason}` envelope.
    pub fn auth_error(reason: impl Into<String>) -> Self {
        let payload = serde_json::json!({ "reason": reason.into() });
        Self::new(MessageType::AuthError, payload)
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// `AUTH` payload (client -> server)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AuthPayload {
    #[validate(length(min = 1, message = "token must not be empty"))]
    pub token: String,
}

/// `JOIN_ROOM` / `LEAVE_ROOM` payload (client -> server)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RoomPayload {
    #[serde(rename = "roomId")]
    #[validate(length(min = 1, max = 128, message = "roomId must be 1-128 characters"))]
    pub room_id: String,
}

/// `AUTH_ERROR` payload (server -> client)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthErrorPayload {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AuthErrorPayload {
    /// Human-readable reason, falling back to a generic message.
    pub fn describe(&self) -> String {
        self.reason
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "Authentication failed".to_string())
    }
}

/// `SYS_ERROR` payload (server -> client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ErrorPayload {
    fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Room membership change direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoomAction {
    Join,
    Leave,
}

/// `ROOM_UPDATE` payload (server -> client)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomUpdatePayload {
    pub action: RoomAction,
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// `ENV_IMPACT_UPDATE` payload (server -> client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvImpactPayload {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub impact: Value,
}

/// `RECONNECT_REQUEST` payload (server -> client)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconnectRequestPayload {
    /// Delay before reconnecting, in milliseconds
    #[serde(default)]
    pub delay: Option<u64>,
}
