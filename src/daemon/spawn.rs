// In-process daemon spawning with a pipe handoff of the daemon PID

use super::daemonize::ForkStage;
use super::handle::ProcessHandle;
use crate::error::{DetachError, Result};
use nix::errno::Errno;
use nix::sys::wait::waitpid;
use nix::unistd::{fork, pipe, setsid, ForkResult, Pid};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

const TAG_DAEMON: i32 = 0;
const TAG_SETSID_FAILED: i32 = 1;
const TAG_FORK_FAILED: i32 = 2;

/// Exit status of a daemon whose body panicked
const PANIC_EXIT_CODE: i32 = 101;

/// Fixed-size record the intermediate process sends back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handoff {
    Daemon(Pid),
    SetsidFailed(Errno),
    ForkFailed(Errno),
}

impl Handoff {
    fn encode(self) -> [u8; 8] {
        let (tag, value) = match self {
            Handoff::Daemon(pid) => (TAG_DAEMON, pid.as_raw()),
            Handoff::SetsidFailed(errno) => (TAG_SETSID_FAILED, errno as i32),
            Handoff::ForkFailed(errno) => (TAG_FORK_FAILED, errno as i32),
        };

        let mut buf = [0u8; 8];
        buf[..4].copy_from_slice(&tag.to_le_bytes());
        buf[4..].copy_from_slice(&value.to_le_bytes());
        buf
    }

    fn decode(buf: [u8; 8]) -> Result<Self> {
        let mut tag = [0u8; 4];
        let mut value = [0u8; 4];
        tag.copy_from_slice(&buf[..4]);
        value.copy_from_slice(&buf[4..]);
        let value = i32::from_le_bytes(value);

        match i32::from_le_bytes(tag) {
            TAG_DAEMON if value > 0 => Ok(Handoff::Daemon(Pid::from_raw(value))),
            TAG_SETSID_FAILED => Ok(Handoff::SetsidFailed(Errno::from_raw(value))),
            TAG_FORK_FAILED => Ok(Handoff::ForkFailed(Errno::from_raw(value))),
            other => Err(DetachError::Handoff(format!(
                "Unexpected handoff record (tag {}, value {})",
                other, value
            ))),
        }
    }

    fn into_result(self) -> Result<ProcessHandle> {
        match self {
            Handoff::Daemon(pid) => Ok(ProcessHandle::new(pid)),
            Handoff::SetsidFailed(errno) => Err(DetachError::Setsid(errno)),
            Handoff::ForkFailed(errno) => Err(DetachError::Fork {
                stage: ForkStage::Second,
                errno,
            }),
        }
    }
}

/// Run `body` in a detached daemon and return a handle to it.
///
/// Performs the same fork, setsid, fork sequence as
/// [`detach`](super::detach), but the calling process keeps running: the
/// intermediate process reports the daemon PID over a pipe and exits, and
/// the caller reaps it before returning. The daemon runs `body` and exits
/// without returning into the caller's code.
///
/// The child processes only perform async-signal-safe calls besides
/// `body`, so this is usable from multi-threaded programs as long as `body`
/// itself is.
pub fn spawn_detached<F>(body: F) -> Result<ProcessHandle>
where
    F: FnOnce(),
{
    let (reader, writer) =
        pipe().map_err(|e| DetachError::Handoff(format!("Failed to create pipe: {}", e)))?;
    let mut reader = File::from(reader);
    let mut writer = File::from(writer);

    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            drop(writer);
            let received = read_handoff(&mut reader);

            // The intermediate exits right after writing; reap it
            if let Err(e) = waitpid(child, None) {
                warn!("Failed to reap intermediate process {}: {}", child, e);
            }

            let handle = received?.into_result()?;
            debug!("Spawned detached daemon {}", handle.pid());
            Ok(handle)
        }
        Ok(ForkResult::Child) => {
            drop(reader);

            let handoff = match setsid() {
                Err(errno) => Handoff::SetsidFailed(errno),
                Ok(_) => match unsafe { fork() } {
                    Ok(ForkResult::Parent { child }) => Handoff::Daemon(child),
                    Ok(ForkResult::Child) => {
                        drop(writer);
                        let status = match catch_unwind(AssertUnwindSafe(body)) {
                            Ok(()) => 0,
                            Err(_) => PANIC_EXIT_CODE,
                        };
                        exit_child(status);
                    }
                    Err(errno) => Handoff::ForkFailed(errno),
                },
            };

            let status = match (writer.write_all(&handoff.encode()), handoff) {
                (Ok(()), Handoff::Daemon(_)) => 0,
                _ => 1,
            };
            exit_child(status);
        }
        Err(errno) => Err(DetachError::Fork {
            stage: ForkStage::First,
            errno,
        }),
    }
}

/// Leave a forked child without running atexit handlers or flushing
/// buffers inherited from the caller
fn exit_child(status: i32) -> ! {
    unsafe { nix::libc::_exit(status) }
}

fn read_handoff(reader: &mut File) -> Result<Handoff> {
    let mut buf = [0u8; 8];
    match reader.read_exact(&mut buf) {
        Ok(()) => Handoff::decode(buf),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(DetachError::Handoff(
            "Intermediate process exited without reporting the daemon PID".to_string(),
        )),
        Err(e) => Err(DetachError::Handoff(format!(
            "Failed to read daemon PID: {}",
            e
        ))),
    }
}
