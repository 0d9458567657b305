//! Port Resolver
//!
//! Detects whether the service port is taken and clears it before a child is
//! spawned:
//!
//! - [`is_occupied`] dials `localhost:port` with a 2 second timeout. Any
//!   successful connect means occupied; every failure (refused, timeout,
//!   resolution error) means free.
//! - [`reclaim`] looks the owner up through [`ProcessControl`], kills it, and
//!   polls until the port is released or the retry budget runs out.

pub mod platform;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;

pub use platform::{ProcessControl, SystemProcessControl};

/// Connect timeout used when probing a port
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Process currently listening on a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortOwner {
    pub pid: u32,
}

/// Port resolver failures
#[derive(Error, Debug)]
pub enum PortError {
    #[error("failed to look up owner of port {port}: {source}")]
    Lookup {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to kill PID {pid}: {source}")]
    Kill {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("port {port} still in use after killing PID {pid}")]
    StillInUse { port: u16, pid: u32 },
}

/// How long `reclaim` waits for a killed owner to release its port
#[derive(Debug, Clone, Copy)]
pub struct ReclaimPolicy {
    /// Number of probes after the kill
    pub attempts: u32,
    /// Delay before each probe
    pub interval: Duration,
    /// Connect timeout of each probe
    pub probe_timeout: Duration,
}

impl Default for ReclaimPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(500),
            probe_timeout: PROBE_TIMEOUT,
        }
    }
}

/// Check whether something accepts connections on `localhost:port`
pub async fn is_occupied(port: u16) -> bool {
    is_occupied_within(port, PROBE_TIMEOUT).await
}

/// [`is_occupied`] with an explicit connect timeout
pub async fn is_occupied_within(port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(("localhost", port))).await,
        Ok(Ok(_))
    )
}

/// Kill whatever listens on `port` and wait for the port to become free.
///
/// Returns the owner that was terminated, or `None` when no listener was
/// found (the port is presumed free already).
pub async fn reclaim(
    port: u16,
    control: Arc<dyn ProcessControl>,
    policy: ReclaimPolicy,
) -> Result<Option<PortOwner>, PortError> {
    let lookup = Arc::clone(&control);
    let owner = tokio::task::spawn_blocking(move || lookup.find_listener(port))
        .await
        .map_err(|e| PortError::Lookup {
            port,
            source: std::io::Error::other(e),
        })?
        .map_err(|source| PortError::Lookup { port, source })?;

    let Some(owner) = owner else {
        tracing::debug!(port, "no listener found, port presumed free");
        return Ok(None);
    };

    tracing::info!(port, pid = owner.pid, "killing process holding port");
    let pid = owner.pid;
    tokio::task::spawn_blocking(move || control.terminate(pid))
        .await
        .map_err(|e| PortError::Kill {
            pid,
            source: std::io::Error::other(e),
        })?
        .map_err(|source| PortError::Kill { pid, source })?;

    for _ in 0..policy.attempts {
        tokio::time::sleep(policy.interval).await;
        if !is_occupied_within(port, policy.probe_timeout).await {
            return Ok(Some(owner));
        }
    }

    Err(PortError::StillInUse { port, pid })
}
