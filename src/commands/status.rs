//! Status command handler

use super::{block_on, CommandContext};
use crate::control::{query_status, StatusResponse, DIAL_TIMEOUT};
use crate::error::{DaemonError, Result};
use crate::port;

/// What `status` found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    /// The daemon answered over the control channel
    Managed(StatusResponse),
    /// No daemon; `listening` comes from a direct probe of `port`
    Unmanaged { port: u16, listening: bool },
}

pub fn run_status(ctx: &CommandContext) -> Result<String> {
    let config = ctx.load_config()?;
    let report = block_on(async {
        match query_status(&ctx.control_endpoint, DIAL_TIMEOUT).await {
            Ok(status) => Ok(StatusReport::Managed(status)),
            Err(DaemonError::NotRunning(_)) => Ok(StatusReport::Unmanaged {
                port: config.port,
                listening: port::is_occupied(config.port).await,
            }),
            Err(e) => Err(e),
        }
    })??;
    Ok(render_status(&report))
}

/// Render the two status lines
pub fn render_status(report: &StatusReport) -> String {
    match report {
        StatusReport::Managed(status) => {
            let api = if status.running {
                format!("listening on :{}", status.port)
            } else {
                "not reachable".to_string()
            };
            format!(
                "Daemon:         running (v{}, uptime {})\ncopilot-api:    {}\n",
                status.version, status.uptime, api
            )
        }
        StatusReport::Unmanaged { port, listening } => {
            let api = if *listening {
                format!("listening on :{} (unmanaged)", port)
            } else {
                "not running".to_string()
            };
            format!("Daemon:         not running\ncopilot-api:    {}\n", api)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_managed_running() {
        let report = StatusReport::Managed(StatusResponse {
            running: true,
            port: 4141,
            uptime: "1h2m3s".to_string(),
            version: "0.2.0".to_string(),
        });
        assert_eq!(
            render_status(&report),
            "Daemon:         running (v0.2.0, uptime 1h2m3s)\ncopilot-api:    listening on :4141\n"
        );
    }

    #[test]
    fn test_render_managed_child_down() {
        let report = StatusReport::Managed(StatusResponse {
            running: false,
            port: 4141,
            uptime: "4s".to_string(),
            version: "0.2.0".to_string(),
        });
        assert!(render_status(&report).ends_with("copilot-api:    not reachable\n"));
    }

    #[test]
    fn test_render_unmanaged() {
        let listening = StatusReport::Unmanaged {
            port: 4141,
            listening: true,
        };
        assert_eq!(
            render_status(&listening),
            "Daemon:         not running\ncopilot-api:    listening on :4141 (unmanaged)\n"
        );

        let idle = StatusReport::Unmanaged {
            port: 4141,
            listening: false,
        };
        assert!(render_status(&idle).ends_with("copilot-api:    not running\n"));
    }
}
