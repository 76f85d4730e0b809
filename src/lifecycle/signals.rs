//! OS signal handling.
//!
//! - SIGTERM / SIGINT → graceful shutdown
//! - SIGHUP → reload the authorization rules, not shutdown

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::authz::Reloader;
use crate::lifecycle::Shutdown;

/// Translate OS signals into shutdown and reload actions until shutdown.
pub fn spawn_signal_handler(shutdown: Shutdown, reloader: Arc<Reloader>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = handle_signals(&shutdown, &reloader).await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
    })
}

#[cfg(unix)]
async fn handle_signals(shutdown: &Shutdown, reloader: &Reloader) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received, shutting down");
                break;
            }
            _ = interrupt.recv() => {
                tracing::info!("SIGINT received, shutting down");
                break;
            }
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, reloading authorization rules");
                // Failures are logged by the reloader.
                let _ = reloader.reload();
            }
        }
    }

    shutdown.trigger();
    Ok(())
}

#[cfg(not(unix))]
async fn handle_signals(shutdown: &Shutdown, _reloader: &Reloader) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received, shutting down");
    shutdown.trigger();
    Ok(())
}
