//! Health Routes
//!
//! - GET /health - Server status with upload and session counts
//! - GET /ping - Bare liveness check

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::{HealthResponse, PingResponse};
use crate::api::state::AppState;

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        active_uploads: state.assembler.active_uploads().await,
        sessions: state.sessions.len().await,
        persistence: state.profiles.backend_name().to_string(),
    })
}

/// GET /ping
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse { ok: true })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping() {
        let Json(body) = ping().await;
        assert!(body.ok);
    }
}
