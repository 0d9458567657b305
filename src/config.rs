//! Daemon configuration management.
//!
//! Handles the copilot-daemon configuration file at:
//! - Linux: ~/.config/copilot-daemon/config.toml
//! - macOS: ~/Library/Application Support/copilot-daemon/config.toml
//! - Windows: %APPDATA%\copilot-daemon\config.toml
//!
//! A missing file yields the defaults, so a fresh install supervises
//! `npx copilot-api@latest start` on port 4141.

use crate::error::DaemonError;
use crate::fs_utils;
use crate::paths::DaemonPaths;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port copilot-api listens on unless configured otherwise
pub const DEFAULT_PORT: u16 = 4141;

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Port the supervised service listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// If true, an existing listener on the port is left alone and the
    /// supervisor exits instead of killing it
    #[serde(default)]
    pub do_not_kill_existing: bool,

    /// Child command settings
    #[serde(default)]
    pub command: CommandConfig,

    /// Restart backoff settings
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            do_not_kill_existing: false,
            command: CommandConfig::default(),
            backoff: BackoffConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Command used to launch the supervised service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Program name or path, resolved on PATH at startup
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments passed to the program
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

fn default_program() -> String {
    "npx".to_string()
}

fn default_args() -> Vec<String> {
    vec!["copilot-api@latest".to_string(), "start".to_string()]
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
        }
    }
}

/// Restart backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// First restart delay in seconds
    #[serde(default = "default_initial_secs")]
    pub initial_secs: u64,

    /// Upper bound for the restart delay in seconds
    #[serde(default = "default_max_secs")]
    pub max_secs: u64,

    /// A run longer than this resets the delay to `initial_secs`
    #[serde(default = "default_healthy_after_secs")]
    pub healthy_after_secs: u64,
}

fn default_initial_secs() -> u64 {
    2
}

fn default_max_secs() -> u64 {
    60
}

fn default_healthy_after_secs() -> u64 {
    120
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_secs: default_initial_secs(),
            max_secs: default_max_secs(),
            healthy_after_secs: default_healthy_after_secs(),
        }
    }
}

impl BackoffConfig {
    pub fn initial(&self) -> Duration {
        Duration::from_secs(self.initial_secs)
    }

    pub fn max(&self) -> Duration {
        Duration::from_secs(self.max_secs)
    }

    pub fn healthy_after(&self) -> Duration {
        Duration::from_secs(self.healthy_after_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory holding the daemon log file
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Size at which the log file is rotated between restarts
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_size_bytes() -> u64 {
    10 * 1024 * 1024
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            max_size_bytes: default_max_size_bytes(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, DaemonError> {
        Self::load_from(&DaemonPaths::resolve().config_file)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, DaemonError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text and normalise it
    pub fn parse(content: &str) -> Result<Self, DaemonError> {
        let mut config: Self = toml::from_str(content).map_err(|e| DaemonError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;
        config.normalize()?;
        Ok(config)
    }

    fn normalize(&mut self) -> Result<(), DaemonError> {
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.command.program.trim().is_empty() {
            return Err(DaemonError::Config {
                message: "command.program must not be empty".to_string(),
            });
        }
        if self.backoff.initial_secs == 0 {
            return Err(DaemonError::Config {
                message: "backoff.initial_secs must be at least 1".to_string(),
            });
        }
        if self.backoff.max_secs < self.backoff.initial_secs {
            self.backoff.max_secs = self.backoff.initial_secs;
        }
        Ok(())
    }

    /// Directory the daemon log lives in
    pub fn log_dir(&self) -> PathBuf {
        self.logging
            .dir
            .clone()
            .unwrap_or_else(|| DaemonPaths::resolve().log_dir)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, DaemonError> {
        toml::to_string_pretty(self).map_err(|e| DaemonError::Config {
            message: format!("Failed to serialize config: {}", e),
        })
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), DaemonError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.to_toml()?;

        // Atomic write
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs_utils::atomic_rename(&temp_path, path)?;

        Ok(())
    }
}
