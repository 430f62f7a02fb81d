//! Application Layer
//!
//! Orchestrates the flow between the presentation layer (WebSocket
//! connections) and the domain collaborators.

pub mod services;
