//! copilot-daemon: process supervisor for copilot-api
//!
//! Keeps a single long-running child process (by default
//! `npx copilot-api@latest start`) alive on a fixed TCP port:
//!
//! - [`supervisor`] restarts the child with exponential backoff, resetting
//!   the delay after a healthy run.
//! - [`port`] detects and reclaims a port held by a foreign process.
//! - [`logmux`] appends all output to a rotating log file and fans it out
//!   to live subscribers.
//! - [`control`] serves `STATUS`, `STOP` and `LOGS` over a local socket
//!   (named pipe on Windows).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use copilot_daemon::{DaemonConfig, LogMux, Supervisor};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> copilot_daemon::Result<()> {
//! let config = DaemonConfig::load()?;
//! let mux = Arc::new(LogMux::open(&config.log_dir().join("daemon.log"), true)?);
//! let mut supervisor = Supervisor::new(&config, mux, CancellationToken::new());
//! supervisor.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod control;
pub mod error;
pub mod fs_utils;
pub mod logmux;
pub mod paths;
pub mod port;
pub mod signals;
pub mod supervisor;

/// Version reported by STATUS and `copilot-daemon version`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used types
pub use config::DaemonConfig;
pub use control::{ControlContext, ControlServer, StatusResponse};
pub use error::{DaemonError, Result};
pub use logmux::{LogMux, SubscriberSet};
pub use paths::DaemonPaths;
pub use port::{PortError, PortOwner, ProcessControl};
pub use supervisor::{Outcome, Supervisor};
