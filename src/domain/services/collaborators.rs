//! External Collaborators
//!
//! Contracts for the systems the sync layer delegates to. Identity
//! verification, game-state computation, environmental-impact tracking and
//! team management all live outside this crate; the dispatcher only sees
//! these traits.
//!
//! # Example
//!
//! ```rust,ignore
//! use sync_gateway::domain::services::{HandlerError, TeamActionHandler, TeamActionOutcome};
//!
//! struct Teams;
//!
//! #[async_trait::async_trait]
//! impl TeamActionHandler for Teams {
//!     async fn process(&self, user_id: &UserId, payload: Value) -> Result<TeamActionOutcome, HandlerError> {
//!         Ok(TeamActionOutcome { team_id: Some(TeamId::new("red")), team_state: payload })
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::value_objects::{TeamId, UserId};

/// Identity verification failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    Expired,

    /// The connection went away while the token was being verified.
    #[error("Connection closed during authentication")]
    ConnectionClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Reason string sent to the client in `AUTH_ERROR`.
    pub fn reason(&self) -> String {
        match self {
            AuthError::MissingToken => "missing_token".into(),
            AuthError::InvalidToken(_) => "invalid_token".into(),
            AuthError::Expired => "token_expired".into(),
            AuthError::ConnectionClosed => "connection_closed".into(),
            AuthError::Internal(_) => "internal_error".into(),
        }
    }
}

/// External handler failure. Reported to the originating connection only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Rejected(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Message safe to send back in `SYS_ERROR`.
    pub fn client_message(&self) -> String {
        match self {
            HandlerError::Rejected(msg) => msg.clone(),
            HandlerError::Internal(_) => "Internal server error".into(),
        }
    }
}

/// Result of a game action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameActionOutcome {
    pub affected_users: Vec<UserId>,
    pub new_state: Value,
}

/// Player state fetched right after authentication
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub team_id: Option<TeamId>,
    pub state: Value,
}

/// Result of a team action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamActionOutcome {
    pub team_id: Option<TeamId>,
    pub team_state: Value,
}

/// Resolves a credential token to a user identity.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserId, AuthError>;
}

/// Authoritative game-state computation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GameStateHandler: Send + Sync {
    /// Apply a player action. The outcome names every user whose view changed.
    async fn process(&self, user_id: &UserId, payload: Value) -> Result<GameActionOutcome, HandlerError>;

    /// Current state for a freshly authenticated player.
    async fn player_state(&self, user_id: &UserId) -> Result<PlayerState, HandlerError>;
}

/// Environmental-impact accounting.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnvironmentalImpactHandler: Send + Sync {
    async fn track(&self, user_id: &UserId, payload: Value) -> Result<Value, HandlerError>;
}

/// Team membership and team-level actions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TeamActionHandler: Send + Sync {
    async fn process(&self, user_id: &UserId, payload: Value) -> Result<TeamActionOutcome, HandlerError>;
}
