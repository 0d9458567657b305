//! Child process launch and output pumping

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::config::CommandConfig;
use crate::error::{DaemonError, Result};
use crate::logmux::LogMux;

/// How long to wait for the output pumps to drain after the child exits.
/// Grandchildren holding the pipes open must not stall the restart cycle.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

const PUMP_BUFFER: usize = 8 * 1024;

/// Locate `program` on PATH.
///
/// On Windows a missing `npx` also tries the scoop nodejs install.
pub fn resolve_program(program: &str) -> Result<PathBuf> {
    match which::which(program) {
        Ok(path) => Ok(path),
        Err(e) => {
            if let Some(path) = fallback_location(program).filter(|p| p.is_file()) {
                return Ok(path);
            }
            Err(DaemonError::Spawn {
                program: program.to_string(),
                message: format!("not found on PATH: {}", e),
            })
        }
    }
}

#[cfg(windows)]
fn fallback_location(program: &str) -> Option<PathBuf> {
    if program != "npx" {
        return None;
    }
    dirs::home_dir().map(|home| {
        home.join("scoop")
            .join("apps")
            .join("nodejs")
            .join("current")
            .join("npx.cmd")
    })
}

#[cfg(not(windows))]
fn fallback_location(_program: &str) -> Option<PathBuf> {
    None
}

/// A spawned child whose stdout and stderr feed the log multiplexer
pub struct SupervisedChild {
    child: Child,
    pid: Option<u32>,
    pumps: Vec<JoinHandle<()>>,
}

impl SupervisedChild {
    /// Spawn the configured command with the inherited environment.
    ///
    /// On Unix the child leads a new process group so the whole tree can be
    /// killed at once.
    pub fn spawn(command: &CommandConfig, mux: &Arc<LogMux>) -> Result<Self> {
        let program = resolve_program(&command.program)?;
        Self::spawn_resolved(&program, &command.args, mux)
    }

    fn spawn_resolved(program: &Path, args: &[String], mux: &Arc<LogMux>) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| DaemonError::Spawn {
            program: program.display().to_string(),
            message: e.to_string(),
        })?;

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(pump(stdout, Arc::clone(mux)));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(pump(stderr, Arc::clone(mux)));
        }

        Ok(Self {
            pid: child.id(),
            child,
            pumps,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the child to exit
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Force-kill the direct child if it is still running
    pub fn start_kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    /// Let the output pumps flush what the child wrote before exiting
    pub async fn drain_output(&mut self) {
        for handle in self.pumps.drain(..) {
            let abort = handle.abort_handle();
            if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, handle).await.is_err() {
                abort.abort();
            }
        }
    }
}

fn pump<R>(mut source: R, mux: Arc<LogMux>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; PUMP_BUFFER];
        let mut warned = false;
        loop {
            match source.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Err(e) = mux.write_chunk(&buf[..n]) {
                        if !warned {
                            tracing::warn!("Failed to append child output to log: {}", e);
                            warned = true;
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!("Child output pipe closed: {}", e);
                    break;
                }
            }
        }
    })
}
