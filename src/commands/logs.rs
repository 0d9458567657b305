//! Logs command handler
//!
//! Streams daemon output to stdout until the daemon closes the connection
//! or the user interrupts.

use super::{block_on, CommandContext};
use crate::control::{tail_logs, DIAL_TIMEOUT};
use crate::error::Result;

pub fn run_logs(ctx: &CommandContext) -> Result<String> {
    block_on(async {
        let mut stdout = tokio::io::stdout();
        tokio::select! {
            copied = tail_logs(&ctx.control_endpoint, DIAL_TIMEOUT, &mut stdout) => copied.map(|_| ()),
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    })??;
    Ok(String::new())
}
