//! # Domain Services
//!
//! Contracts for the external collaborators the sync layer delegates to.
//!
//! ## Services
//!
//! - **IdentityVerifier**: token to user id
//! - **GameStateHandler**: game actions and initial player state
//! - **EnvironmentalImpactHandler**: environmental impact tracking
//! - **TeamActionHandler**: team actions and team assignment

mod collaborators;

pub use collaborators::*;
