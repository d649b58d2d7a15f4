use axum::{extract::State, Json};
use tracing::debug;

use crate::models::{HealthResponse, ReadyResponse};
use crate::AppState;

/// Health check endpoint: service name plus live room and connection counts
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    debug!("Health check requested");
    let stats = state.relay.stats();
    Json(HealthResponse {
        status: "ok".to_string(),
        service: state.config.service_name.clone(),
        rooms: stats.rooms,
        connections: stats.connections,
    })
}

/// Readiness check endpoint
pub async fn ready_check() -> Json<ReadyResponse> {
    debug!("Readiness check requested");
    // The relay keeps all state in memory, so it is ready once it serves requests
    Json(ReadyResponse {
        status: "ok".to_string(),
        message: "Service is ready".to_string(),
    })
}
