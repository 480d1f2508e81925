//! Prometheus metrics endpoint.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;

use crate::metrics;
use crate::server::AppState;

/// GET /metrics - Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    update_metrics_from_state(&state).await;

    match metrics::encode_metrics() {
        Ok(output) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain")],
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Refresh gauges that are derived from state rather than events
async fn update_metrics_from_state(state: &AppState) {
    metrics::NOTIFICATIONS_ACTIVE.set(state.presenter.active_count() as i64);

    let age = match state.realtime.snapshot().await {
        Some(snapshot) => snapshot
            .last_connected_at
            .map(|at| (Utc::now() - at).num_seconds().max(0))
            .unwrap_or(-1),
        None => -1,
    };
    metrics::LAST_CONNECTED_AGE_SECONDS.set(age);
}
