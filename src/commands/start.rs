//! Foreground daemon
//!
//! Opens the log sink, installs tracing on top of it, binds the control
//! endpoint and runs the supervisor until a signal or a STOP request
//! cancels it.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use super::CommandContext;
use crate::config::DaemonConfig;
use crate::control::{ControlContext, ControlServer, LocalListener, SUBSCRIBER_WRITE_TIMEOUT};
use crate::error::{DaemonError, Result};
use crate::logmux::LogMux;
use crate::paths;
use crate::port::PROBE_TIMEOUT;
use crate::signals::spawn_signal_watcher;
use crate::supervisor::{Outcome, Supervisor};

/// Run the daemon
///
/// This creates a tokio runtime and blocks until shutdown. Child crashes
/// never surface as an error; only startup failures do.
pub fn run_start(ctx: &CommandContext) -> Result<String> {
    let config = ctx.load_config()?;

    let runtime = tokio::runtime::Runtime::new().map_err(|e| DaemonError::Config {
        message: format!("Failed to create tokio runtime: {}", e),
    })?;

    runtime.block_on(run_start_async(ctx, config))?;

    // Exits cleanly - everything went to the log
    Ok(String::new())
}

/// Install the tracing subscriber. Output goes through the log multiplexer,
/// which appends to the log file, echoes to stderr and feeds LOGS clients.
fn init_tracing(level: &str, mux: &Arc<LogMux>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("copilot_daemon={}", level)))
        .unwrap_or_else(|_| EnvFilter::new("copilot_daemon=info"));

    let writer = mux.writer();
    // May fail if already initialized, which is fine
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .try_init();
}

/// Bind the control endpoint, or log why the daemon runs without one.
///
/// This includes an endpoint still held by another live daemon.
fn bind_control(endpoint: &Path) -> Option<LocalListener> {
    match LocalListener::bind(endpoint) {
        Ok(listener) => {
            tracing::info!("Control channel at {}", endpoint.display());
            Some(listener)
        }
        Err(e) => {
            tracing::warn!(
                "Control channel unavailable ({}), running without remote control",
                e
            );
            None
        }
    }
}

async fn run_start_async(ctx: &CommandContext, config: DaemonConfig) -> Result<()> {
    let log_path = paths::log_file_in(&config.log_dir());
    let mux = Arc::new(LogMux::open(&log_path, true)?);
    init_tracing(&config.logging.level, &mux);

    tracing::info!(
        "copilot-daemon {} starting (config {})",
        crate::VERSION,
        ctx.config_file.display()
    );
    tracing::info!("Logging to {}", log_path.display());

    let cancel = CancellationToken::new();
    let signals = spawn_signal_watcher(cancel.clone());
    let mut supervisor = Supervisor::new(&config, Arc::clone(&mux), cancel.clone());

    let control = Arc::new(ControlContext {
        port: supervisor.port(),
        started_at: supervisor.started_at(),
        version: crate::VERSION.to_string(),
        cancel: cancel.clone(),
        subscribers: Arc::clone(mux.subscribers()),
        probe_timeout: PROBE_TIMEOUT,
        log_write_timeout: SUBSCRIBER_WRITE_TIMEOUT,
    });

    let server = bind_control(&ctx.control_endpoint)
        .map(|listener| tokio::spawn(ControlServer::new(listener, control).serve()));

    let outcome = supervisor.run().await;

    cancel.cancel();
    if let Some(server) = server {
        let _ = server.await;
    }
    let _ = signals.await;
    mux.subscribers().clear();

    match outcome? {
        Outcome::Stopped => tracing::info!("copilot-daemon stopped"),
        Outcome::PortHeld => tracing::info!("copilot-daemon exiting, port left to its owner"),
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::control::{dial, DIAL_TIMEOUT};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_bind_control_on_fresh_endpoint() {
        let dir = TempDir::new().unwrap();
        let endpoint = dir.path().join("run/ctl.sock");
        assert!(bind_control(&endpoint).is_some());
    }

    #[tokio::test]
    async fn test_bind_control_held_by_live_daemon_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let endpoint = dir.path().join("ctl.sock");
        let _running = LocalListener::bind(&endpoint).unwrap();

        assert!(bind_control(&endpoint).is_none());
        // The live daemon keeps its endpoint
        assert!(endpoint.exists());
        assert!(dial(&endpoint, DIAL_TIMEOUT).await.is_ok());
    }

    #[tokio::test]
    async fn test_bind_control_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        assert!(bind_control(&blocker.join("ctl.sock")).is_none());
    }
}
