use std::time::Duration;

use anyhow::{bail, Result};
use tokio::signal;

use uni_earn_notifications::config::Settings;
use uni_earn_notifications::metrics::encode_metrics;
use uni_earn_notifications::telemetry::init_telemetry;
use uni_earn_notifications::{ConnectionState, Notification, NotificationService, NotificationType};

/// How long to wait for the session task to close the socket on shutdown
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    let _telemetry = init_telemetry(&settings.logging, &settings.otel)?;
    tracing::info!(url = %settings.stomp.url, "Configuration loaded");

    let listener = &settings.listener;
    if listener.username.is_empty() || listener.token.is_empty() {
        bail!("LISTENER__USERNAME and LISTENER__TOKEN must be set");
    }

    let service = NotificationService::new(settings.stomp.clone());
    let session = service.connect(
        &listener.username,
        |notification: Notification, kind: NotificationType| {
            tracing::info!(
                notification_type = %kind,
                payload = %notification.to_json(),
                "Notification received"
            );
        },
        &listener.token,
    )?;

    // Log connection state changes in background
    let mut state_rx = session.watch_state();
    let state_handle = tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow_and_update();
            tracing::info!(state = state.as_str(), "Notification connection state");
        }
    });

    shutdown_signal().await;

    session.disconnect();
    let mut state_rx = session.watch_state();
    let closed = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
        let _ = state_rx
            .wait_for(|state| *state == ConnectionState::Disconnected)
            .await;
    })
    .await;
    if closed.is_err() {
        tracing::warn!("Timed out waiting for the notification session to close");
    }

    let stats = session.stats();
    tracing::info!(
        dispatched = stats.total_dispatched,
        fallbacks = stats.fallbacks,
        "Notification listener stopped"
    );
    if let Ok(metrics) = encode_metrics() {
        tracing::debug!(metrics = %metrics, "Final metrics");
    }

    drop(session);
    let _ = state_handle.await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, disconnecting");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, disconnecting");
        }
    }
}
