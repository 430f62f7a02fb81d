//! Application Services
//!
//! Server-side coordination of connections, rooms and inbound actions.
//!
//! ## Available Services
//!
//! - **SessionRegistry**: connection table, authentication, liveness sweep
//! - **RoomRouter**: room/team membership and targeted broadcast
//! - **ActionDispatcher**: typed routing of inbound messages
//! - **HeartbeatMonitor**: periodic sweep task

pub mod action_dispatcher;
pub mod heartbeat;
pub mod room_router;
pub mod session_registry;

pub use action_dispatcher::{ActionDispatcher, Disposition};
pub use heartbeat::HeartbeatMonitor;
pub use room_router::{RoomRouter, RouterError};
pub use session_registry::{SessionRegistry, SweepReport};
