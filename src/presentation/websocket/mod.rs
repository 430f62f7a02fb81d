//! WebSocket Endpoint
//!
//! Real-time communication via WebSocket connections.

pub mod handler;

pub use handler::ws_handler;
