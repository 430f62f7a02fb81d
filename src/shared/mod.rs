//! Shared Utilities
//!
//! Wire protocol, validation helpers, and errors used by client and server.

pub mod error;
pub mod protocol;
pub mod validation;
