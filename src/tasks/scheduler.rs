use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration};

use crate::core::state::AppState;
use crate::tasks::maintenance;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let period = Duration::from_secs(state.settings().exam().sweep_interval_seconds);

    let handles = vec![
        tokio::spawn(close_expired_loop(state.clone(), period, shutdown_rx.clone())),
        tokio::spawn(finalize_elapsed_loop(state.clone(), period, shutdown_rx.clone())),
    ];

    tracing::info!(sweep_interval_seconds = period.as_secs(), "Background worker started");

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn close_expired_loop(state: AppState, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(period);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = maintenance::close_expired_attempts(&state).await {
                    tracing::error!(error = %err, "close_expired_attempts failed");
                }
            }
        }
    }
}

async fn finalize_elapsed_loop(
    state: AppState,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(period);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = maintenance::finalize_elapsed_exams(&state).await {
                    tracing::error!(error = %err, "finalize_elapsed_exams failed");
                }
            }
        }
    }
}
