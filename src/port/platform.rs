//! Platform process control: listener lookup and forced termination
//!
//! Unix uses `lsof` for the port table and signals via `nix`; Windows uses
//! `netstat -ano` and `taskkill`. The table parsers are plain functions so
//! both formats are tested on every host.

use std::io;
use std::process::Command;

use once_cell::sync::Lazy;
use regex::Regex;

use super::PortOwner;

/// OS capabilities the supervisor needs to manage processes it does not own
pub trait ProcessControl: Send + Sync {
    /// Find the process listening on exactly `port`, if any
    fn find_listener(&self, port: u16) -> io::Result<Option<PortOwner>>;

    /// Forcibly terminate a single process
    fn terminate(&self, pid: u32) -> io::Result<()>;

    /// Forcibly terminate a process together with all of its descendants
    fn terminate_tree(&self, pid: u32) -> io::Result<()>;
}

/// `ProcessControl` backed by the host operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessControl;

#[cfg(unix)]
impl ProcessControl for SystemProcessControl {
    fn find_listener(&self, port: u16) -> io::Result<Option<PortOwner>> {
        let output = Command::new("lsof")
            .args(["-nP", "-iTCP", "-sTCP:LISTEN"])
            .output()?;

        // lsof exits 1 when nothing matched; only a missing binary is an error
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_lsof_listener(&stdout, port))
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::from(e)),
        }
    }

    fn terminate_tree(&self, pid: u32) -> io::Result<()> {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        // Children are spawned as process-group leaders, so pgid == pid
        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => Ok(()),
            Err(nix::errno::Errno::ESRCH) => self.terminate(pid),
            Err(e) => Err(io::Error::from(e)),
        }
    }
}

#[cfg(windows)]
impl ProcessControl for SystemProcessControl {
    fn find_listener(&self, port: u16) -> io::Result<Option<PortOwner>> {
        let output = Command::new("netstat")
            .args(["-ano", "-p", "TCP"])
            .output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "netstat exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_netstat_listener(&stdout, port))
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        taskkill(&["/F", "/PID", &pid.to_string()])
    }

    fn terminate_tree(&self, pid: u32) -> io::Result<()> {
        taskkill(&["/F", "/T", "/PID", &pid.to_string()])
    }
}

#[cfg(windows)]
fn taskkill(args: &[&str]) -> io::Result<()> {
    let output = Command::new("taskkill").args(args).output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!(
            "taskkill {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stdout).trim()
        )))
    }
}

/// `node    12345 me   21u  IPv4 0x1234  0t0  TCP 127.0.0.1:4141 (LISTEN)`
static LSOF_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\S+\s+(\d+)\s+.*:(\d+)\s+\(LISTEN\)\s*$").expect("valid lsof regex")
});

/// `  TCP    127.0.0.1:4141    0.0.0.0:0    LISTENING    12345`
static NETSTAT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*TCP\s+(\S+)\s+\S+\s+LISTENING\s+(\d+)\s*$").expect("valid netstat regex")
});

/// Find the listener bound to exactly `port` in `lsof -nP -iTCP -sTCP:LISTEN` output
#[cfg_attr(not(unix), allow(dead_code))]
pub(crate) fn parse_lsof_listener(output: &str, port: u16) -> Option<PortOwner> {
    output.lines().find_map(|line| {
        let caps = LSOF_LINE.captures(line)?;
        let bound: u16 = caps[2].parse().ok()?;
        if bound != port {
            return None;
        }
        let pid = caps[1].parse().ok()?;
        Some(PortOwner { pid })
    })
}

/// Find the listener bound to exactly `port` in `netstat -ano -p TCP` output
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn parse_netstat_listener(output: &str, port: u16) -> Option<PortOwner> {
    output.lines().find_map(|line| {
        let caps = NETSTAT_LINE.captures(line.trim_end_matches('\r'))?;
        let (_, bound) = caps[1].rsplit_once(':')?;
        if bound.parse::<u16>().ok()? != port {
            return None;
        }
        let pid = caps[2].parse().ok()?;
        Some(PortOwner { pid })
    })
}
