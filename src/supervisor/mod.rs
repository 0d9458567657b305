//! Supervisor Loop
//!
//! Keeps one child process alive on a fixed port:
//!
//! ```text
//! Idle → Starting → Running → (Backoff → Starting)* → Stopped
//! ```
//!
//! Each cycle clears the port (or gives up when preemption is disabled),
//! spawns the child, waits for it to exit or for cancellation, then sleeps
//! with exponential backoff before the next start. `Stopped` is reached only
//! through the cancellation token.

pub mod backoff;
pub mod child;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::{CommandConfig, DaemonConfig};
use crate::error::Result;
use crate::logmux::LogMux;
use crate::port::{self, ProcessControl, ReclaimPolicy, SystemProcessControl};

pub use backoff::Backoff;
pub use child::{resolve_program, SupervisedChild};

/// Time allowed for a killed child to be reaped
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Supervisor lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Running,
    Backoff,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Backoff => "backoff",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// How [`Supervisor::run`] finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Cancelled; the child tree was killed and reaped
    Stopped,
    /// The port was already taken and preemption is disabled
    PortHeld,
}

enum Wake {
    Exited(std::io::Result<std::process::ExitStatus>),
    Cancelled,
}

pub struct Supervisor {
    port: u16,
    do_not_kill_existing: bool,
    command: CommandConfig,
    backoff: Backoff,
    max_log_size: u64,
    mux: Arc<LogMux>,
    control: Arc<dyn ProcessControl>,
    reclaim_policy: ReclaimPolicy,
    cancel: CancellationToken,
    started_at: Instant,
    phase: Phase,
}

impl Supervisor {
    pub fn new(config: &DaemonConfig, mux: Arc<LogMux>, cancel: CancellationToken) -> Self {
        Self {
            port: config.port,
            do_not_kill_existing: config.do_not_kill_existing,
            command: config.command.clone(),
            backoff: Backoff::from_config(&config.backoff),
            max_log_size: config.logging.max_size_bytes,
            mux,
            control: Arc::new(SystemProcessControl),
            reclaim_policy: ReclaimPolicy::default(),
            cancel,
            started_at: Instant::now(),
            phase: Phase::Idle,
        }
    }

    /// Replace the OS process table access (port owner lookup and kills)
    pub fn with_process_control(mut self, control: Arc<dyn ProcessControl>) -> Self {
        self.control = control;
        self
    }

    pub fn with_reclaim_policy(mut self, policy: ReclaimPolicy) -> Self {
        self.reclaim_policy = policy;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn transition(&mut self, next: Phase) {
        tracing::debug!(from = %self.phase, to = %next, "supervisor phase");
        self.phase = next;
    }

    fn stopped(&mut self) -> Result<Outcome> {
        self.transition(Phase::Stopped);
        tracing::info!("Shutdown complete");
        Ok(Outcome::Stopped)
    }

    /// Run restart cycles until cancelled or the port is held by someone else
    pub async fn run(&mut self) -> Result<Outcome> {
        tracing::info!(
            port = self.port,
            program = %self.command.program,
            "Supervisor starting"
        );
        self.rotate_log();

        loop {
            if self.cancel.is_cancelled() {
                return self.stopped();
            }
            self.transition(Phase::Starting);

            if !self.clear_port().await {
                tracing::info!(
                    port = self.port,
                    "Port already in use and do_not_kill_existing is set, exiting"
                );
                self.transition(Phase::Stopped);
                return Ok(Outcome::PortHeld);
            }

            let started = Instant::now();
            let elapsed = match SupervisedChild::spawn(&self.command, &self.mux) {
                Ok(mut child) => {
                    self.transition(Phase::Running);
                    tracing::info!(pid = ?child.pid(), "Started {}", self.command.program);

                    let wake = tokio::select! {
                        status = child.wait() => Wake::Exited(status),
                        _ = self.cancel.cancelled() => Wake::Cancelled,
                    };

                    match wake {
                        Wake::Cancelled => {
                            self.terminate(&mut child).await;
                            return self.stopped();
                        }
                        Wake::Exited(status) => {
                            child.drain_output().await;
                            let elapsed = started.elapsed();
                            match status {
                                Ok(status) => tracing::warn!(
                                    "{} exited after {}s: {}",
                                    self.command.program,
                                    elapsed.as_secs(),
                                    status
                                ),
                                Err(e) => tracing::error!(
                                    "Failed waiting for {}: {}",
                                    self.command.program,
                                    e
                                ),
                            }
                            elapsed
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    Duration::ZERO
                }
            };

            if self.backoff.record_run(elapsed) {
                tracing::debug!("Child ran long enough to be healthy, backoff reset");
            }

            self.transition(Phase::Backoff);
            let delay = self.backoff.current();
            tracing::info!("Restarting in {}s", delay.as_secs_f64());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => {
                    tracing::info!("Shutdown requested during backoff");
                    return self.stopped();
                }
            }

            self.backoff.advance();
            self.rotate_log();
        }
    }

    fn rotate_log(&self) {
        match self.mux.rotate_if_needed(self.max_log_size) {
            Ok(true) => tracing::info!("Rotated log file {}", self.mux.path().display()),
            Ok(false) => {}
            Err(e) => tracing::warn!("Log rotation failed: {}", e),
        }
    }

    /// Make sure nothing else listens on the port before spawning.
    ///
    /// Returns false when the port is taken and preemption is disabled.
    /// Reclaim failures are logged and the cycle goes on.
    async fn clear_port(&self) -> bool {
        if !port::is_occupied_within(self.port, self.reclaim_policy.probe_timeout).await {
            return true;
        }
        if self.do_not_kill_existing {
            return false;
        }

        tracing::warn!(port = self.port, "Port already in use, reclaiming");
        match port::reclaim(self.port, Arc::clone(&self.control), self.reclaim_policy).await {
            Ok(Some(owner)) => {
                tracing::info!(port = self.port, pid = owner.pid, "Port reclaimed")
            }
            Ok(None) => tracing::warn!(port = self.port, "Port busy but no owner found"),
            Err(e) => tracing::warn!("Could not reclaim port: {}", e),
        }
        true
    }

    /// Kill the child's whole process tree and reap it
    async fn terminate(&self, child: &mut SupervisedChild) {
        tracing::info!("Stopping {}", self.command.program);

        if let Some(pid) = child.pid() {
            let control = Arc::clone(&self.control);
            let killed = tokio::task::spawn_blocking(move || control.terminate_tree(pid)).await;
            match killed {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(pid, "Failed to kill process tree: {}", e),
                Err(e) => tracing::warn!(pid, "Kill task failed: {}", e),
            }
        }
        // Covers a missing pid or a failed tree kill
        let _ = child.start_kill();

        match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!("Child reaped: {}", status),
            Ok(Err(e)) => tracing::warn!("Failed to reap child: {}", e),
            Err(_) => tracing::warn!("Child not reaped within {}s", REAP_TIMEOUT.as_secs()),
        }
        child.drain_output().await;
    }
}
