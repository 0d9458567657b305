//! Error types and exit codes for copilot-daemon

use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

/// Main error type for copilot-daemon operations
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Cannot open log file {path}: {source}")]
    LogSink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("Control channel error: {message}")]
    Ipc { message: String },

    #[error("Cannot connect to daemon (is it running?): {0}")]
    NotRunning(std::io::Error),

    #[error("Unexpected reply from daemon: {message}")]
    Protocol { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    /// Convert error to an exit code:
    /// - 0: Success
    /// - 1: IO error / unreachable daemon
    /// - 2: Configuration error
    /// - 3: Log sink could not be opened
    /// - 4: Child program could not be located or spawned
    /// - 5: Control channel or protocol failure
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) | Self::NotRunning(_) => ExitCode::from(1),
            Self::Config { .. } => ExitCode::from(2),
            Self::LogSink { .. } => ExitCode::from(3),
            Self::Spawn { .. } => ExitCode::from(4),
            Self::Ipc { .. } | Self::Protocol { .. } => ExitCode::from(5),
        }
    }
}

/// Result type alias for copilot-daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;
