//! Common test utilities and fixtures for copilot-daemon integration tests
//!
//! This module provides:
//! - `TestDaemon` for running a supervisor and control server in-process
//! - Fake process control so tests never kill real port owners
//! - Port and polling helpers

#![allow(unused_imports)]
#![allow(dead_code)]

#[cfg(unix)]
pub mod daemon;

#[cfg(unix)]
pub use daemon::{HeldPortControl, TestDaemon};

use std::time::Duration;

/// A port nothing listens on right now
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// Poll `check` every 10ms until it holds, panicking after `within`
pub async fn eventually<F: FnMut() -> bool>(within: Duration, what: &str, mut check: F) {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}
