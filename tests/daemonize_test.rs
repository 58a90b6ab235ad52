// Integration tests driving the doublefork binary
#![cfg(unix)]

use doublefork::daemon::ProcessHandle;
use nix::sys::resource::{setrlimit, Resource};
use nix::unistd::{geteuid, getsid, setgid, setuid, Gid, Uid};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_doublefork");

/// Terminates the daemon when a test finishes, pass or fail
struct DaemonGuard(ProcessHandle);

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        if self.0.is_alive() {
            let _ = self.0.terminate(Duration::from_secs(5));
        }
    }
}

/// Run the fixture and return its output along with the invoked PID
fn run_fixture(args: &[&str]) -> (Output, u32) {
    let child = Command::new(BIN)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start doublefork");
    let invoked = child.id();
    let output = child.wait_with_output().expect("Failed to wait for doublefork");
    (output, invoked)
}

fn daemon_from(output: &Output) -> DaemonGuard {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1, "expected one line, got {:?}", stdout);
    DaemonGuard(ProcessHandle::from_announcement(lines[0]).unwrap())
}

#[test]
fn test_prints_single_announcement() {
    let (output, invoked) = run_fixture(&["--sleep-secs", "30"]);

    assert_eq!(output.status.code(), Some(0));
    assert!(output.stderr.is_empty(), "unexpected stderr: {:?}", output.stderr);

    let daemon = daemon_from(&output);
    assert!(daemon.0.is_alive());
    assert_ne!(daemon.0.pid(), invoked as i32);
    assert_ne!(daemon.0.pid(), std::process::id() as i32);
}

#[test]
fn test_daemon_is_detached_from_session() {
    let (output, _) = run_fixture(&["--sleep-secs", "30"]);
    let daemon = daemon_from(&output);

    assert!(!daemon.0.is_session_leader().unwrap());
    let our_session = getsid(None).unwrap().as_raw();
    assert_ne!(daemon.0.session_id().unwrap(), our_session);

    if let Some(has_tty) = daemon.0.has_controlling_terminal() {
        assert!(!has_tty);
    }
}

#[test]
fn test_concurrent_runs_yield_distinct_daemons() {
    let spawn = || {
        Command::new(BIN)
            .args(["--sleep-secs", "30"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap()
    };
    let first = spawn();
    let second = spawn();

    let first = daemon_from(&first.wait_with_output().unwrap());
    let second = daemon_from(&second.wait_with_output().unwrap());

    assert_ne!(first.0.pid(), second.0.pid());
    assert!(first.0.is_alive());
    assert!(second.0.is_alive());
}

#[test]
fn test_sigterm_stops_daemon_early() {
    let (output, _) = run_fixture(&["--sleep-secs", "120"]);
    let daemon = daemon_from(&output);
    assert!(daemon.0.is_alive());

    daemon.0.terminate(Duration::from_secs(5)).unwrap();
    assert!(!daemon.0.is_alive());
}

#[test]
fn test_daemon_runs_workload_and_exits() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("daemon.log");

    let (output, _) = run_fixture(&[
        "--sleep-secs",
        "1",
        "--log-level",
        "info",
        "--log-file",
        log_path.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(0));
    let daemon = daemon_from(&output);

    assert!(daemon.0.wait_for_exit(Duration::from_secs(10)));

    let log = fs::read_to_string(&log_path).unwrap();
    assert!(log.contains(&format!("Daemon {} sleeping for 1s", daemon.0.pid())));
    assert!(log.contains(&format!("Daemon {} finished sleeping", daemon.0.pid())));
}

#[cfg(target_os = "linux")]
#[test]
fn test_chdir_root() {
    let (output, _) = run_fixture(&["--sleep-secs", "30", "--chdir-root"]);
    let daemon = daemon_from(&output);

    // The change happens right after the stdio redirect that closed our pipe
    let cwd_link = format!("/proc/{}/cwd", daemon.0.pid());
    let mut cwd = fs::read_link(&cwd_link).unwrap();
    for _ in 0..50 {
        if cwd == PathBuf::from("/") {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
        cwd = fs::read_link(&cwd_link).unwrap();
    }
    assert_eq!(cwd, PathBuf::from("/"));
}

#[test]
fn test_invalid_configuration_exits_with_error() {
    let (output, _) = run_fixture(&["--sleep-secs", "0"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("sleep_secs"), "stderr: {}", stderr);
}

/// Unprivileged account the fork-failure run drops to when tests run as root
const NOBODY: u32 = 65534;

/// Copy the binary somewhere an unprivileged user can execute it from
fn world_executable_copy(dir: &TempDir) -> PathBuf {
    let target = dir.path().join("doublefork");
    fs::copy(BIN, &target).unwrap();
    fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();
    fs::set_permissions(&target, fs::Permissions::from_mode(0o755)).unwrap();
    target
}

#[test]
fn test_fork_failure_is_reported() {
    let temp_dir = TempDir::new().unwrap();

    // RLIMIT_NPROC does not bind root, so drop to an unprivileged user first
    let as_root = geteuid().is_root();
    let program = if as_root {
        world_executable_copy(&temp_dir)
    } else {
        PathBuf::from(BIN)
    };

    let mut command = Command::new(program);
    command
        .args(["--sleep-secs", "30"])
        .current_dir("/")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    unsafe {
        command.pre_exec(move || {
            if as_root {
                setgid(Gid::from_raw(NOBODY))?;
                setuid(Uid::from_raw(NOBODY))?;
            }
            setrlimit(Resource::RLIMIT_NPROC, 0, 0)?;
            Ok(())
        });
    }

    let output = command.output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty(), "stdout: {:?}", output.stdout);

    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr.lines().next().unwrap_or_default();
    assert!(line.starts_with("fork #1 failed: "), "stderr: {}", stderr);
    assert!(line.ends_with(')'), "stderr: {}", stderr);
    assert!(!stderr.contains("Daemon PID"));
}
