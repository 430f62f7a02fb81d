//! Client connection state.

use serde::Serialize;

/// Why a connection manager ended up in the terminal `error` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "errorType", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    /// No `AUTH_SUCCESS`/`AUTH_ERROR` before the handshake deadline.
    AuthTimeout,
    /// Server answered `AUTH_ERROR`.
    AuthRejected(String),
    /// The retry budget is exhausted.
    MaxReconnectAttempts,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthTimeout => "auth_timeout",
            Self::AuthRejected(_) => "auth_error",
            Self::MaxReconnectAttempts => "max_reconnect_attempts",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthRejected(reason) => write!(f, "auth_error: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Single source of truth for a connection manager's lifecycle.
///
/// `Connected` holds if and only if the transport is open and the handshake
/// succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Reconnecting { attempt: u32, max_attempts: u32 },
    Error { reason: FailureReason },
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// States in which losing the transport should drive a reconnection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Authenticating | Self::Connected | Self::Reconnecting { .. }
        )
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_serialization() {
        let state = ConnectionState::Error {
            reason: FailureReason::AuthTimeout,
        };
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({"status": "error", "reason": {"errorType": "auth_timeout"}})
        );
    }

    #[test]
    fn test_terminal_states_are_not_retryable() {
        assert!(!ConnectionState::Disconnected.is_retryable());
        assert!(!ConnectionState::Error {
            reason: FailureReason::AuthRejected("bad".into())
        }
        .is_retryable());
        assert!(ConnectionState::Connected.is_retryable());
    }
}
