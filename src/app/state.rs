//! Application state shared by the game listener and the status routes

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::game::GameMatch;
use crate::net::hub::BroadcastHub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Arc<BroadcastHub>,
    pub game: Arc<GameMatch>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Fixed seed replays the same seeker picks, spawns and layouts
        let seed = config.match_seed.unwrap_or_else(rand::random);
        info!(seed, "Match RNG seeded");

        let hub = Arc::new(BroadcastHub::new());
        let game = GameMatch::new(hub.clone(), config.timings, seed);

        Self { config, hub, game }
    }
}
