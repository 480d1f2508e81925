use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::health::{health, status};
use super::metrics::prometheus_metrics;
use super::notifications::{click_notification, list_notifications};
use super::session::{reconnect, signal_online, signal_visible};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & status
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/metrics", get(prometheus_metrics))
        // Session control
        .route("/reconnect", post(reconnect))
        .route("/signals/visible", post(signal_visible))
        .route("/signals/online", post(signal_online))
        // Desktop notifications
        .route("/notifications", get(list_notifications))
        .route("/notifications/{tag}/click", post(click_notification))
}
