//! HTTP route definitions

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::app::AppState;
use crate::util::time::uptime_secs;

/// Build the status router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    phase: &'static str,
    theme: &'static str,
    seeker_id: Option<String>,
    players: usize,
    living_hiders: usize,
    objects: usize,
    connections: usize,
    max_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health_report(&state))
}

fn health_report(state: &AppState) -> HealthResponse {
    let status = state.game.status();

    HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        phase: status.phase.as_str(),
        theme: status.theme.as_str(),
        seeker_id: status.seeker_id,
        players: status.players,
        living_hiders: status.living_hiders,
        objects: status.objects,
        connections: state.hub.len(),
        max_players: state.config.max_players,
    }
}
