//! Well-known filesystem locations for the daemon
//!
//! Every process on the host (the supervisor and the CLI commands talking to
//! it) must agree on these paths, so they are derived only from the platform
//! directories and never from the working directory.

use std::path::PathBuf;

/// Application directory name used under the platform config/data dirs
pub const APP_DIR: &str = "copilot-daemon";

/// Name of the daemon log file
pub const LOG_FILE_NAME: &str = "copilot-daemon.log";

/// Named pipe address of the control channel on Windows
#[cfg(windows)]
pub const PIPE_NAME: &str = r"\\.\pipe\copilot-daemon";

/// Resolved locations for config, logs and the control endpoint
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    /// Daemon configuration file
    pub config_file: PathBuf,
    /// Directory holding the daemon log
    pub log_dir: PathBuf,
    /// Control channel endpoint (socket path, or pipe name on Windows)
    pub control_endpoint: PathBuf,
}

impl DaemonPaths {
    /// Resolve paths for the current platform
    pub fn resolve() -> Self {
        let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
        let config = dirs::config_dir().unwrap_or_else(|| home.join(".config"));
        let data = dirs::data_local_dir().unwrap_or_else(|| home.join(".local/share"));

        Self {
            config_file: config.join(APP_DIR).join("config.toml"),
            log_dir: data.join(APP_DIR).join("logs"),
            control_endpoint: default_control_endpoint(),
        }
    }
}

/// Path of the daemon log file inside `log_dir`
pub fn log_file_in(log_dir: &std::path::Path) -> PathBuf {
    log_dir.join(LOG_FILE_NAME)
}

#[cfg(unix)]
fn default_control_endpoint() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(format!("{}.sock", APP_DIR))
}

#[cfg(windows)]
fn default_control_endpoint() -> PathBuf {
    PathBuf::from(PIPE_NAME)
}
