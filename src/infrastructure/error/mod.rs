use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("No active realtime session")]
    NoSession,

    #[error("Realtime manager stopped")]
    ManagerStopped,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

fn redacted(detail: String, public: &str) -> String {
    if is_production() {
        public.to_string()
    } else {
        detail
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let log_message = self.to_string();
        let (status, code, client_message) = match &self {
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                redacted(log_message.clone(), "Configuration error"),
            ),
            AppError::Transport(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "TRANSPORT_ERROR",
                redacted(log_message.clone(), "Service temporarily unavailable"),
            ),
            AppError::NoSession => (
                StatusCode::CONFLICT,
                "NO_SESSION",
                log_message.clone(),
            ),
            AppError::ManagerStopped => (
                StatusCode::SERVICE_UNAVAILABLE,
                "MANAGER_STOPPED",
                log_message.clone(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                redacted(log_message.clone(), "Internal server error"),
            ),
        };

        // Always log the detailed error server-side
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "API error"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
