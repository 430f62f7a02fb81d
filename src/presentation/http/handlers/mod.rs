//! HTTP Handlers
//!
//! Request handlers for the operational HTTP endpoints.

pub mod health;
pub mod metrics;
