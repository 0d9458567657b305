//! Command modules for the copilot-daemon CLI
//!
//! Each command module implements a single top-level command:
//! - `start` - Run the supervisor and control server in the foreground
//! - `status` - Query the daemon, falling back to a direct port probe
//! - `stop` - Ask the daemon to shut down
//! - `logs` - Tail daemon output
//! - `config` - Show or initialise the configuration file
//!
//! Handlers return the text to print on stdout; errors carry their own exit
//! code (see [`crate::error::DaemonError::exit_code`]).

pub mod config;
pub mod logs;
pub mod start;
pub mod status;
pub mod stop;

pub use config::run_config;
pub use logs::run_logs;
pub use start::run_start;
pub use status::run_status;
pub use stop::run_stop;

use std::future::Future;
use std::path::{Path, PathBuf};

use crate::config::DaemonConfig;
use crate::error::{DaemonError, Result};
use crate::paths::DaemonPaths;

/// Shared context passed to all command handlers
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Configuration file in effect
    pub config_file: PathBuf,
    /// Control channel endpoint
    pub control_endpoint: PathBuf,
}

impl CommandContext {
    /// Resolve locations, honouring an explicit `--config`
    pub fn new(config_override: Option<&Path>) -> Self {
        let paths = DaemonPaths::resolve();
        Self {
            config_file: config_override
                .map(Path::to_path_buf)
                .unwrap_or(paths.config_file),
            control_endpoint: paths.control_endpoint,
        }
    }

    pub fn load_config(&self) -> Result<DaemonConfig> {
        DaemonConfig::load_from(&self.config_file)
    }
}

/// Run a client-side future on a single-threaded runtime
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| DaemonError::Ipc {
            message: format!("Failed to create tokio runtime: {}", e),
        })?;
    Ok(runtime.block_on(future))
}

/// Version banner printed by `copilot-daemon version`
pub fn run_version() -> Result<String> {
    Ok(format!("copilot-daemon {}\n", crate::VERSION))
}
