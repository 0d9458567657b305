//! Control-Plane Server
//!
//! A local IPC endpoint through which other processes query the supervisor,
//! stop it, or tail its output.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 copilot-daemon (start)                       │
//! │                                                              │
//! │  LocalListener ──accept──► handle_connection (task per conn) │
//! │                              │ STATUS → ControlContext       │
//! │                              │ STOP   → CancellationToken    │
//! │                              │ LOGS   → SubscriberSet        │
//! │                                                              │
//! │  Supervisor ──child output──► LogMux ──broadcast──► LOGS     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The endpoint is a Unix domain socket (mode 0600) or a Windows named pipe,
//! so access control is left to the operating system.

pub mod client;
pub mod protocol;
pub mod server;
pub mod transport;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::logmux::SubscriberSet;
use crate::port;

pub use client::{query_status, request_stop, tail_logs};
pub use protocol::{format_uptime, Command, StatusResponse};
pub use server::{handle_connection, ControlServer, SUBSCRIBER_WRITE_TIMEOUT};
pub use transport::{dial, LocalListener};

/// Timeout for client-side dials to the control endpoint
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// Daemon state shared with every control connection
pub struct ControlContext {
    /// Port of the supervised service
    pub port: u16,
    /// When the supervisor started
    pub started_at: Instant,
    pub version: String,
    /// Process-wide shutdown signal, raised by STOP
    pub cancel: CancellationToken,
    /// LOGS subscribers, shared with the log multiplexer
    pub subscribers: Arc<SubscriberSet>,
    /// Connect timeout of the liveness probe behind STATUS
    pub probe_timeout: Duration,
    /// How long a LOGS client may block a single write before it is dropped
    pub log_write_timeout: Duration,
}

impl ControlContext {
    /// Build the STATUS reply from a fresh port probe
    pub async fn snapshot(&self) -> StatusResponse {
        StatusResponse {
            running: port::is_occupied_within(self.port, self.probe_timeout).await,
            port: self.port,
            uptime: format_uptime(self.started_at.elapsed()),
            version: self.version.clone(),
        }
    }
}
