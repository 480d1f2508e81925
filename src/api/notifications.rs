use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::presenter::DesktopNotification;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    pub count: usize,
    pub notifications: Vec<DesktopNotification>,
}

#[derive(Debug, Serialize)]
pub struct ClickResponse {
    pub tag: String,
    pub navigate_to: String,
}

/// GET /notifications
pub async fn list_notifications(State(state): State<AppState>) -> Json<NotificationListResponse> {
    let notifications = state.presenter.list();
    Json(NotificationListResponse {
        count: notifications.len(),
        notifications,
    })
}

/// POST /notifications/{tag}/click - dismiss and return the deep link
pub async fn click_notification(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<ClickResponse>> {
    let navigate_to = state
        .presenter
        .click(&tag)
        .ok_or_else(|| AppError::NotFound(format!("Notification '{}' not found", tag)))?;

    Ok(Json(ClickResponse { tag, navigate_to }))
}
