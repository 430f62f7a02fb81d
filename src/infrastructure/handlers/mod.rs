//! Reference collaborator implementations.

mod memory;

pub use memory::{InMemoryGameState, InMemoryImpactLedger, InMemoryTeams};
