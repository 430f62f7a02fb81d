//! # Domain Entities
//!
//! - **Connection**: one physical link and its authenticated identity
//! - **Room**: a broadcast scope grouping connections

mod connection;
mod room;

pub use connection::{Connection, ConnectionSender, OutboundFrame};
pub use room::Room;
