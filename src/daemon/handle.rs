// Handle to a running daemon process

use crate::error::{DetachError, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{getsid, Pid};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const ANNOUNCEMENT_PREFIX: &str = "Daemon PID ";

/// Poll interval while waiting for a signalled daemon to go away
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Identifies a detached daemon by PID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pid: Pid,
}

impl ProcessHandle {
    pub fn new(pid: Pid) -> Self {
        Self { pid }
    }

    /// Create a handle from a raw PID
    pub fn from_raw(pid: i32) -> Result<Self> {
        if pid <= 0 {
            return Err(DetachError::Other(format!("Invalid process ID: {}", pid)));
        }
        Ok(Self::new(Pid::from_raw(pid)))
    }

    /// Parse the `Daemon PID <n>` line printed by the intermediate process
    pub fn from_announcement(line: &str) -> Result<Self> {
        let raw = line
            .trim_end_matches(['\r', '\n'])
            .strip_prefix(ANNOUNCEMENT_PREFIX)
            .ok_or_else(|| DetachError::Other(format!("Not a daemon announcement: {:?}", line)))?;

        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DetachError::Other(format!(
                "Invalid PID in announcement: {:?}",
                line
            )));
        }

        let pid = raw
            .parse::<i32>()
            .map_err(|e| DetachError::Other(format!("Invalid PID in announcement: {}", e)))?;
        Self::from_raw(pid)
    }

    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    /// Check whether the daemon still exists and has not become a zombie
    pub fn is_alive(&self) -> bool {
        // Signal 0 only checks for existence
        match kill(self.pid, None) {
            Ok(()) | Err(Errno::EPERM) => {}
            Err(_) => return false,
        }

        // A reparented daemon lingers as a zombie until its new parent reaps it
        !is_defunct(self.pid)
    }

    /// Session the daemon belongs to
    pub fn session_id(&self) -> Result<i32> {
        getsid(Some(self.pid))
            .map(|sid| sid.as_raw())
            .map_err(|e| DetachError::Other(format!("getsid({}) failed: {}", self.pid, e)))
    }

    /// A detached daemon must not lead its session
    pub fn is_session_leader(&self) -> Result<bool> {
        Ok(self.session_id()? == self.pid())
    }

    /// Whether the daemon has a controlling terminal, where the platform
    /// lets us find out
    pub fn has_controlling_terminal(&self) -> Option<bool> {
        controlling_terminal(self.pid)
    }

    /// Send a signal to the daemon
    pub fn signal(&self, signal: Signal) -> Result<()> {
        kill(self.pid, signal)
            .map_err(|e| DetachError::SignalError(format!("Failed to send {}: {}", signal, e)))
    }

    /// Stop the daemon with SIGTERM, escalating to SIGKILL after `timeout`
    pub fn terminate(&self, timeout: Duration) -> Result<()> {
        info!("Stopping daemon (PID: {})", self.pid);
        self.signal(Signal::SIGTERM)?;

        if self.wait_for_exit(timeout) {
            debug!("Daemon {} stopped", self.pid);
            return Ok(());
        }

        warn!(
            "Daemon {} did not stop within {:?}, sending SIGKILL",
            self.pid, timeout
        );
        self.signal(Signal::SIGKILL)?;

        if self.wait_for_exit(Duration::from_secs(1)) {
            return Ok(());
        }

        Err(DetachError::SignalError(format!(
            "Daemon {} survived SIGKILL",
            self.pid
        )))
    }

    /// Poll until the daemon is gone or `timeout` elapses
    pub fn wait_for_exit(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if !self.is_alive() {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(target_os = "linux")]
fn is_defunct(pid: Pid) -> bool {
    match proc_stat::read(pid) {
        Some(stat) => matches!(stat.state, 'Z' | 'X' | 'x'),
        None => true,
    }
}

#[cfg(not(target_os = "linux"))]
fn is_defunct(_pid: Pid) -> bool {
    false
}

#[cfg(target_os = "linux")]
fn controlling_terminal(pid: Pid) -> Option<bool> {
    proc_stat::read(pid).map(|stat| stat.tty_nr != 0)
}

#[cfg(not(target_os = "linux"))]
fn controlling_terminal(_pid: Pid) -> Option<bool> {
    None
}

/// Reading `/proc/<pid>/stat`
#[cfg(target_os = "linux")]
mod proc_stat {
    use nix::unistd::Pid;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProcStat {
        pub state: char,
        pub tty_nr: i32,
    }

    pub fn read(pid: Pid) -> Option<ProcStat> {
        let contents = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
        parse(&contents)
    }

    pub fn parse(contents: &str) -> Option<ProcStat> {
        // comm may itself contain parentheses and spaces
        let rest = &contents[contents.rfind(')')? + 1..];
        let mut fields = rest.split_whitespace();

        let state = fields.next()?.chars().next()?;
        let _ppid = fields.next()?;
        let _pgrp = fields.next()?;
        let _session = fields.next()?;
        let tty_nr = fields.next()?.parse().ok()?;

        Some(ProcStat { state, tty_nr })
    }

}
