use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use chat_realtime::config::Settings;
use chat_realtime::presenter::{LogPresenter, Presenters};
use chat_realtime::realtime::{ChatHandlers, RealtimeManager, UserId};
use chat_realtime::server::{create_app, AppState};
use chat_realtime::telemetry::init_telemetry;
use chat_realtime::transport::create_transport;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first: tracing setup depends on it
    let settings = Settings::new()?;

    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!(
        transport = %settings.realtime.transport,
        channel = %settings.realtime.channel,
        "Configuration loaded"
    );

    let transport = create_transport(&settings)?;
    let presenter = Arc::new(LogPresenter::new());

    let mut manager = RealtimeManager::from_settings(
        transport,
        Presenters::shared(presenter.clone()),
        &settings,
    );

    let identity = settings.realtime.user_id.as_deref().map(UserId::from);
    if identity.is_none() {
        tracing::warn!("No realtime.user_id configured, running without a subscription");
    }
    let handle = manager.start(log_handlers(), identity);

    let state = AppState::new(settings.clone(), handle, presenter);
    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler())
        .await?;

    tracing::info!("Releasing realtime subscription");
    manager.dispose().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Handlers for the headless runner: every change is just logged
fn log_handlers() -> ChatHandlers {
    ChatHandlers::new()
        .on_conversation_change(|change| {
            tracing::info!(
                event_type = ?change.event_type,
                conversation_id = ?change.conversation_id,
                "Conversation changed"
            );
        })
        .on_message_change(|change| {
            tracing::info!(
                event_type = ?change.event_type,
                message_id = ?change.message_id,
                conversation_id = ?change.conversation_id,
                "Message changed"
            );
        })
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
