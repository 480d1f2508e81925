//! Health check and session status endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::realtime::ConnectionSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub transport: String,
    pub realtime: RealtimeHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct RealtimeHealthResponse {
    /// Whether a session is running at all
    pub active: bool,
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub session: ConnectionSnapshot,
    pub active_notifications: usize,
}

/// GET /health
///
/// `healthy` when subscribed, `degraded` while a session is trying to
/// reconnect, `idle` when no identity is configured. Always 200.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let active = state.realtime.is_active();
    let connected = state.realtime.is_connected();

    let status = match (active, connected) {
        (_, true) => "healthy",
        (true, false) => "degraded",
        (false, false) => "idle",
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        transport: state.settings.realtime.transport.clone(),
        realtime: RealtimeHealthResponse { active, connected },
    })
}

/// GET /status - full session snapshot
pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    if !state.realtime.is_active() {
        return Err(AppError::NoSession);
    }

    let session = state
        .realtime
        .snapshot()
        .await
        .ok_or(AppError::ManagerStopped)?;

    Ok(Json(StatusResponse {
        session,
        active_notifications: state.presenter.active_count(),
    }))
}
