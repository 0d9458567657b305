//! Control channel wire format
//!
//! A client sends a single line naming a command. The reply depends on the
//! command:
//!
//! ```text
//! STATUS  -> {"running":true,"port":4141,"uptime":"1h2m3s","version":"0.2.0"}
//! STOP    -> stopping
//! LOGS    -> raw log bytes until either side goes away
//! other   -> unknown command
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Acknowledgement line for STOP
pub const STOP_ACK: &str = "stopping";

/// Reply line for anything that is not a known command
pub const UNKNOWN_REPLY: &str = "unknown command";

/// Longest command line the server will read
pub const MAX_COMMAND_LEN: u64 = 256;

/// Commands understood by the control server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Status,
    Stop,
    Logs,
}

impl Command {
    /// Parse a command line, ignoring surrounding whitespace
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "STATUS" => Some(Self::Status),
            "STOP" => Some(Self::Stop),
            "LOGS" => Some(Self::Logs),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "STATUS",
            Self::Stop => "STOP",
            Self::Logs => "LOGS",
        }
    }

    /// Line sent by clients, newline included
    pub fn line(&self) -> String {
        format!("{}\n", self.as_str())
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply to STATUS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Whether the supervised service accepts connections on its port
    pub running: bool,
    pub port: u16,
    /// Supervisor uptime, e.g. `2m5s`
    pub uptime: String,
    pub version: String,
}

/// Render a duration rounded to whole seconds as `1h2m3s` / `2m5s` / `7s`
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = (elapsed.as_millis() + 500) / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);

    if h > 0 {
        format!("{}h{}m{}s", h, m, s)
    } else if m > 0 {
        format!("{}m{}s", m, s)
    } else {
        format!("{}s", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_commands() {
        assert_eq!(Command::parse("STATUS"), Some(Command::Status));
        assert_eq!(Command::parse("STOP\r\n"), Some(Command::Stop));
        assert_eq!(Command::parse("  LOGS \n"), Some(Command::Logs));
    }

    #[test]
    fn test_parse_rejects_unknown_and_lowercase() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("status"), None);
        assert_eq!(Command::parse("RESTART"), None);
        assert_eq!(Command::parse("STATUS extra"), None);
    }

    #[test]
    fn test_command_line_round_trip() {
        for cmd in [Command::Status, Command::Stop, Command::Logs] {
            assert_eq!(Command::parse(&cmd.line()), Some(cmd));
        }
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::ZERO), "0s");
        assert_eq!(format_uptime(Duration::from_millis(1499)), "1s");
        assert_eq!(format_uptime(Duration::from_millis(1500)), "2s");
        assert_eq!(format_uptime(Duration::from_secs(125)), "2m5s");
        assert_eq!(format_uptime(Duration::from_secs(3600)), "1h0m0s");
        assert_eq!(format_uptime(Duration::from_secs(3723)), "1h2m3s");
    }

    #[test]
    fn test_status_json_shape() {
        let status = StatusResponse {
            running: true,
            port: 4141,
            uptime: "5s".to_string(),
            version: "0.2.0".to_string(),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(
            json,
            r#"{"running":true,"port":4141,"uptime":"5s","version":"0.2.0"}"#
        );
    }
}
