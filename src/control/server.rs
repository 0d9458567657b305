//! Control channel connection handler
//!
//! Every accepted connection gets its own task. A connection carries exactly
//! one command; the handler answers it and closes the stream, except for
//! LOGS, which stays open as a live log tail.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::control::protocol::{Command, MAX_COMMAND_LEN, STOP_ACK, UNKNOWN_REPLY};
use crate::control::transport::LocalListener;
use crate::control::ControlContext;
use crate::logmux::queue_subscriber;

/// Time allowed to flush queued log chunks to a LOGS client at shutdown
const LOGS_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A LOGS client that accepts no bytes for this long is dropped
pub const SUBSCRIBER_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Control-plane server bound to the local endpoint
pub struct ControlServer {
    listener: LocalListener,
    ctx: Arc<ControlContext>,
}

impl ControlServer {
    pub fn new(listener: LocalListener, ctx: Arc<ControlContext>) -> Self {
        Self { listener, ctx }
    }

    /// Accept connections until the cancellation token fires.
    ///
    /// The listener is dropped on return, which releases the endpoint.
    pub async fn serve(mut self) {
        let cancel = self.ctx.cancel.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(stream) => {
                        let ctx = Arc::clone(&self.ctx);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, ctx).await {
                                tracing::warn!("Control connection failed: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept control connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
        tracing::debug!("Control server stopped");
    }
}

/// Handle a single control connection
pub async fn handle_connection<S>(stream: S, ctx: Arc<ControlContext>) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let mut line = Vec::new();
    let mut limited = (&mut reader).take(MAX_COMMAND_LEN);
    let read = tokio::select! {
        read = limited.read_until(b'\n', &mut line) => read?,
        _ = ctx.cancel.cancelled() => return Ok(()),
    };
    if read == 0 {
        return Ok(());
    }

    // Bytes that are not UTF-8 fall through to the unknown-command reply
    match std::str::from_utf8(&line).ok().and_then(Command::parse) {
        Some(Command::Status) => {
            let status = ctx.snapshot().await;
            let mut reply = serde_json::to_string(&status)?;
            reply.push('\n');
            writer.write_all(reply.as_bytes()).await?;
            writer.shutdown().await?;
        }
        Some(Command::Stop) => {
            tracing::info!("Stop requested over control channel");
            let acked = async {
                writer.write_all(format!("{}\n", STOP_ACK).as_bytes()).await?;
                writer.flush().await?;
                writer.shutdown().await
            }
            .await;
            drop(writer);
            // The caller must see the ack before shutdown starts
            ctx.cancel.cancel();
            acked?;
        }
        Some(Command::Logs) => serve_logs(reader, writer, &ctx).await?,
        None => {
            tracing::debug!(
                "Unknown control command: {:?}",
                String::from_utf8_lossy(&line).trim()
            );
            writer
                .write_all(format!("{}\n", UNKNOWN_REPLY).as_bytes())
                .await?;
            writer.shutdown().await?;
        }
    }

    Ok(())
}

/// Stream log output to a subscriber until it disconnects or the daemon stops
async fn serve_logs<R, W>(
    mut reader: R,
    mut writer: W,
    ctx: &ControlContext,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (subscriber, mut rx) = queue_subscriber();
    let id = ctx.subscribers.add(Box::new(subscriber));
    tracing::debug!(subscriber = id, "Log subscriber attached");

    let mut discard = [0u8; 512];
    let outcome: std::io::Result<bool> = loop {
        tokio::select! {
            chunk = rx.recv() => match chunk {
                Some(chunk) => {
                    let written =
                        tokio::time::timeout(ctx.log_write_timeout, writer.write_all(&chunk)).await;
                    match written {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => break Err(e),
                        Err(_) => {
                            break Err(std::io::Error::new(
                                std::io::ErrorKind::TimedOut,
                                "log subscriber stalled",
                            ))
                        }
                    }
                }
                // Removed from the set, e.g. cleared at shutdown
                None => break Ok(false),
            },
            read = reader.read(&mut discard) => match read {
                Ok(0) | Err(_) => break Ok(false),
                Ok(_) => {}
            },
            _ = ctx.cancel.cancelled() => break Ok(true),
        }
    };

    ctx.subscribers.remove(id);
    tracing::debug!(subscriber = id, "Log subscriber detached");

    let shutting_down = outcome?;
    if shutting_down {
        let _ = tokio::time::timeout(LOGS_DRAIN_TIMEOUT, async {
            while let Ok(chunk) = rx.try_recv() {
                writer.write_all(&chunk).await?;
            }
            Ok::<(), std::io::Error>(())
        })
        .await;
    }
    let _ = writer.shutdown().await;
    Ok(())
}
