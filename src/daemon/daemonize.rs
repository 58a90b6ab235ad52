// Double-fork daemonization for Unix systems

use crate::error::{DetachError, Result};
use nix::unistd::{dup2, fork, setsid, ForkResult, Pid};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::io::AsRawFd;
use tracing::debug;

/// Which of the two forks an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkStage {
    First,
    Second,
}

impl fmt::Display for ForkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForkStage::First => write!(f, "1"),
            ForkStage::Second => write!(f, "2"),
        }
    }
}

/// The part a process plays after `detach` returns in it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The invoking process. `child` is the intermediate session leader.
    Original { child: Pid },
    /// The session leader created by the first fork. `daemon` is its child.
    Intermediate { daemon: Pid },
    /// The detached grandchild. Only this role runs the daemon body.
    Daemon,
}

/// Fork, start a new session, and fork again.
///
/// Returns once in each of the three process generations with that
/// process's [`Role`]. A failed second fork or `setsid` is returned in the
/// intermediate process; the original has already received
/// `Role::Original` by then.
pub fn detach() -> Result<Role> {
    // First fork
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            debug!("First fork created pid {}", child);
            return Ok(Role::Original { child });
        }
        Ok(ForkResult::Child) => {}
        Err(errno) => {
            return Err(DetachError::Fork {
                stage: ForkStage::First,
                errno,
            });
        }
    }

    // Become leader of a new session, dropping the controlling terminal
    let sid = setsid().map_err(DetachError::Setsid)?;
    debug!("Started new session {}", sid);

    // Second fork so the daemon is not a session leader and can never
    // reacquire a controlling terminal
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            debug!("Second fork created pid {}", child);
            Ok(Role::Intermediate { daemon: child })
        }
        Ok(ForkResult::Child) => Ok(Role::Daemon),
        Err(errno) => Err(DetachError::Fork {
            stage: ForkStage::Second,
            errno,
        }),
    }
}

/// The line the intermediate process prints to announce the daemon
pub fn announcement(daemon: Pid) -> String {
    format!("Daemon PID {}", daemon)
}

/// Print the announcement line and flush it before the caller exits
pub fn announce<W: Write>(out: &mut W, daemon: Pid) -> Result<()> {
    writeln!(out, "{}", announcement(daemon))?;
    out.flush()?;
    Ok(())
}

/// Redirect stdin, stdout and stderr to /dev/null
pub fn detach_stdio() -> Result<()> {
    let devnull = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(|e| DetachError::Stdio(format!("Failed to open /dev/null: {}", e)))?;

    let devnull_fd = devnull.as_raw_fd();
    for (name, target) in [
        ("stdin", nix::libc::STDIN_FILENO),
        ("stdout", nix::libc::STDOUT_FILENO),
        ("stderr", nix::libc::STDERR_FILENO),
    ] {
        dup2(devnull_fd, target)
            .map_err(|e| DetachError::Stdio(format!("Failed to redirect {}: {}", name, e)))?;
    }

    Ok(())
}

/// Change working directory to root so no mount point is kept busy
pub fn chdir_root() -> Result<()> {
    std::env::set_current_dir("/")
        .map_err(|e| DetachError::Other(format!("Failed to change directory to /: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fork_stage_display() {
        assert_eq!(ForkStage::First.to_string(), "1");
        assert_eq!(ForkStage::Second.to_string(), "2");
    }

    #[test]
    fn test_announcement_format() {
        assert_eq!(announcement(Pid::from_raw(4242)), "Daemon PID 4242");
    }

    #[test]
    fn test_announce_writes_single_line() {
        let mut out = Vec::new();
        announce(&mut out, Pid::from_raw(17)).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Daemon PID 17\n");
    }
}
