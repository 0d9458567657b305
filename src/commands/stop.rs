//! Stop command handler

use super::{block_on, CommandContext};
use crate::control::{request_stop, DIAL_TIMEOUT};
use crate::error::Result;

pub fn run_stop(ctx: &CommandContext) -> Result<String> {
    let ack = block_on(request_stop(&ctx.control_endpoint, DIAL_TIMEOUT))??;
    Ok(format!("Daemon: {}\n", ack))
}
