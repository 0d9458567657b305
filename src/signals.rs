//! OS shutdown signals
//!
//! [`wait_for_shutdown_signal`] completes on SIGINT, SIGTERM or SIGQUIT
//! (Unix) or Ctrl-C (Windows). [`spawn_signal_watcher`] turns the first such
//! signal into a cancellation of the daemon.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C")
}

/// Cancel `cancel` on the first shutdown signal.
///
/// The watcher also exits quietly when the token is cancelled elsewhere.
pub fn spawn_signal_watcher(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            received = wait_for_shutdown_signal() => match received {
                Ok(name) => {
                    tracing::info!("Received {}, shutting down", name);
                    cancel.cancel();
                }
                Err(e) => tracing::warn!("Signal handling unavailable: {}", e),
            },
            _ = cancel.cancelled() => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_watcher_exits_when_cancelled_elsewhere() {
        let cancel = CancellationToken::new();
        let watcher = spawn_signal_watcher(cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), watcher)
            .await
            .unwrap()
            .unwrap();
    }
}
