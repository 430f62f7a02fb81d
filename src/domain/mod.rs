//! # Domain Layer
//!
//! Core types of the sync layer, independent of the transport and of the
//! web framework.
//!
//! ## Structure
//!
//! - **entities**: Connection and Room
//! - **value_objects**: identifiers, client connection state, error window
//! - **services**: external collaborator contracts
//!
//! ## Design Principles
//!
//! - No dependencies on infrastructure or presentation layers
//! - Collaborator traits define what the core needs from the outside world

pub mod entities;
pub mod services;
pub mod value_objects;

// Re-export commonly used types
pub use entities::*;
pub use value_objects::*;
