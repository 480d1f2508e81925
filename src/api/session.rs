//! Session control endpoints. Each one only enqueues a command; the result
//! shows up in `/status`.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::realtime::EnvironmentSignal;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
    pub action: &'static str,
}

/// POST /reconnect
pub async fn reconnect(State(state): State<AppState>) -> Result<(StatusCode, Json<AcceptedResponse>)> {
    deliver(&state, EnvironmentSignal::ManualReconnect)
}

/// POST /signals/visible
pub async fn signal_visible(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<AcceptedResponse>)> {
    deliver(&state, EnvironmentSignal::Visible)
}

/// POST /signals/online
pub async fn signal_online(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<AcceptedResponse>)> {
    deliver(&state, EnvironmentSignal::Online)
}

fn deliver(
    state: &AppState,
    signal: EnvironmentSignal,
) -> Result<(StatusCode, Json<AcceptedResponse>)> {
    if !state.realtime.is_active() {
        return Err(AppError::NoSession);
    }

    tracing::info!(signal = signal.as_str(), "Environment signal received over HTTP");
    state.realtime.signal(signal);

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            accepted: true,
            action: signal.as_str(),
        }),
    ))
}
