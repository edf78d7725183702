//! Game simulation modules

pub mod combat;
pub mod lobby;
pub mod r#match;
pub mod physics;
pub mod placement;
pub mod registry;
pub mod snapshot;
pub mod theme;

pub use r#match::{GameMatch, MatchPhase};
