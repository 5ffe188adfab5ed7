//! HTTP route definitions

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::app::AppState;
use crate::game::RoomStatus;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::Phase;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    room_id: String,
    phase: Phase,
    participants: usize,
    connections: usize,
}

impl HealthResponse {
    fn from_status(status: &RoomStatus, connections: usize) -> Self {
        Self {
            status: "ok",
            uptime_secs: uptime_secs(),
            room_id: status.room_id.clone(),
            phase: status.phase,
            participants: status.participants.len(),
            connections,
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::from_status(
        &state.room_status(),
        state.outbox.len(),
    ))
}

// ============================================================================
// Room status
// ============================================================================

async fn status_handler(State(state): State<AppState>) -> Json<RoomStatus> {
    Json(state.room_status())
}
