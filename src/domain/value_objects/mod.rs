//! Value Objects
//!
//! Immutable value types used across the domain.

mod connection_state;
mod error_window;
mod ids;

pub use connection_state::{ConnectionState, FailureReason};
pub use error_window::ErrorWindow;
pub use ids::{ConnectionId, RoomId, TeamId, UserId};
