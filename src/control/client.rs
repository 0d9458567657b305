//! Client side of the control channel, used by the `status`, `stop` and
//! `logs` commands.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::control::protocol::{Command, StatusResponse, STOP_ACK};
use crate::control::transport::{dial, ClientStream};
use crate::error::{DaemonError, Result};

async fn open(endpoint: &Path, timeout: Duration, command: Command) -> Result<ClientStream> {
    let mut stream = dial(endpoint, timeout)
        .await
        .map_err(DaemonError::NotRunning)?;
    stream
        .write_all(command.line().as_bytes())
        .await
        .map_err(|e| DaemonError::Ipc {
            message: format!("failed to send {}: {}", command, e),
        })?;
    Ok(stream)
}

async fn read_reply<S: AsyncRead + Unpin>(stream: &mut S, command: Command) -> Result<String> {
    let mut reply = String::new();
    stream
        .read_to_string(&mut reply)
        .await
        .map_err(|e| DaemonError::Ipc {
            message: format!("failed to read {} reply: {}", command, e),
        })?;
    Ok(reply)
}

/// Ask the daemon for its status
pub async fn query_status(endpoint: &Path, timeout: Duration) -> Result<StatusResponse> {
    let mut stream = open(endpoint, timeout, Command::Status).await?;
    let reply = read_reply(&mut stream, Command::Status).await?;
    serde_json::from_str(reply.trim()).map_err(|e| DaemonError::Protocol {
        message: format!("invalid STATUS reply {:?}: {}", reply.trim(), e),
    })
}

/// Ask the daemon to shut down. Returns the acknowledgement line.
pub async fn request_stop(endpoint: &Path, timeout: Duration) -> Result<String> {
    let mut stream = open(endpoint, timeout, Command::Stop).await?;
    let reply = read_reply(&mut stream, Command::Stop).await?;
    let ack = reply.trim();
    if ack != STOP_ACK {
        return Err(DaemonError::Protocol {
            message: format!("expected {:?}, got {:?}", STOP_ACK, ack),
        });
    }
    Ok(ack.to_string())
}

/// Stream daemon output into `out` until the daemon closes the connection.
///
/// Returns the number of bytes copied.
pub async fn tail_logs<W>(endpoint: &Path, timeout: Duration, out: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut stream = open(endpoint, timeout, Command::Logs).await?;
    let copied = tokio::io::copy(&mut stream, out)
        .await
        .map_err(|e| DaemonError::Ipc {
            message: format!("log stream interrupted: {}", e),
        })?;
    out.flush().await?;
    Ok(copied)
}
