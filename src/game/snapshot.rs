//! Snapshot building for network transmission

use crate::net::protocol::ServerMsg;

use super::registry::{ObjectRegistry, PlayerRegistry};
use super::MatchPhase;

/// Builds canonical state messages from the registries
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Full state: phase, every player, every object
    pub fn full_state(
        phase: MatchPhase,
        players: &PlayerRegistry,
        objects: &ObjectRegistry,
    ) -> ServerMsg {
        ServerMsg::FullState {
            phase,
            players: players.snapshot().iter().map(|p| p.to_record()).collect(),
            objects: objects.snapshot().iter().map(|o| o.to_record()).collect(),
        }
    }

    /// Object layout sent once at match start
    pub fn initial_objects(objects: &ObjectRegistry) -> ServerMsg {
        ServerMsg::InitialObjects {
            objects: objects.snapshot().iter().map(|o| o.to_record()).collect(),
        }
    }

    pub fn player_list(players: &PlayerRegistry) -> ServerMsg {
        ServerMsg::PlayerList {
            names: players.names(),
        }
    }
}
