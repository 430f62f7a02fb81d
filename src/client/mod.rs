//! Client Connection Manager
//!
//! Keeps one authenticated transport socket open to the gateway, retries
//! with exponential backoff when it drops, and buffers outbound messages
//! while offline.

pub mod backoff;
pub mod config;
pub mod events;
pub mod handlers;
pub mod manager;
pub mod transport;

pub use backoff::Backoff;
pub use config::ClientConfig;
pub use events::ClientEvent;
pub use handlers::{HandlerTable, InboundKind, MessageHandler};
pub use manager::{ConnectionManager, SendOutcome};
pub use transport::{Connector, TransportEvent, TransportLink, WsConnector};
