//! # Sync Gateway Library
//!
//! This crate provides the real-time synchronization layer of a multiplayer
//! application:
//! - An authoritative WebSocket server (session registry, rooms, teams)
//! - A reconnecting client connection manager with an offline outbox
//! - A typed JSON envelope protocol shared by both sides
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Connection entities, identifiers, and collaborator traits
//! - **Application Layer**: Session registry, room router, action dispatcher, heartbeat sweep
//! - **Infrastructure Layer**: JWT identity verification, metrics, reference handlers
//! - **Presentation Layer**: HTTP routes and the WebSocket endpoint
//! - **Client**: Connection manager driving a transport socket
//!
//! ## Module Structure
//!
//! ```text
//! sync_gateway/
//! +-- config/         Configuration management
//! +-- domain/         Entities, value objects, and collaborator traits
//! +-- application/    Registry, router, dispatcher, heartbeat
//! +-- infrastructure/ JWT verifier, metrics, reference handlers
//! +-- presentation/   HTTP routes and WebSocket handler
//! +-- client/         Reconnecting connection manager
//! +-- shared/         Wire protocol, validation, errors
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Server-side services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Client-side connection manager
pub mod client;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
