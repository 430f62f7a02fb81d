//! Infrastructure Layer
//!
//! Contains implementations for external concerns including:
//! - JWT identity verification
//! - Prometheus metrics
//! - In-memory reference handlers for the game collaborators

pub mod auth;
pub mod handlers;
pub mod metrics;
