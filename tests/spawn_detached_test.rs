// Integration tests for spawning a detached daemon from library code
#![cfg(unix)]

use doublefork::daemon::spawn_detached;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[test]
fn test_spawn_detached_returns_live_daemon() {
    let handle = spawn_detached(|| std::thread::sleep(Duration::from_secs(30))).unwrap();

    assert_ne!(handle.pid(), std::process::id() as i32);
    assert!(handle.is_alive());
    assert!(!handle.is_session_leader().unwrap());

    handle.terminate(Duration::from_secs(5)).unwrap();
    assert!(!handle.is_alive());
}

#[test]
fn test_spawn_detached_runs_body() {
    let temp_dir = TempDir::new().unwrap();
    let marker = temp_dir.path().join("body-ran");
    let body_marker = marker.clone();

    let handle = spawn_detached(move || {
        let _ = std::fs::write(&body_marker, b"done");
    })
    .unwrap();

    let start = Instant::now();
    while !marker.exists() && start.elapsed() < Duration::from_secs(5) {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(std::fs::read(&marker).unwrap(), b"done");

    // The daemon exits once the body returns
    assert!(handle.wait_for_exit(Duration::from_secs(5)));
}

#[test]
fn test_spawn_detached_daemons_are_independent() {
    let first = spawn_detached(|| std::thread::sleep(Duration::from_secs(30))).unwrap();
    let second = spawn_detached(|| std::thread::sleep(Duration::from_secs(30))).unwrap();

    assert_ne!(first.pid(), second.pid());
    assert_ne!(first.session_id().unwrap(), second.session_id().unwrap());

    first.terminate(Duration::from_secs(5)).unwrap();
    assert!(!first.is_alive());
    assert!(second.is_alive());

    second.terminate(Duration::from_secs(5)).unwrap();
}

#[test]
fn test_spawn_detached_daemon_exits_after_panicking_body() {
    let handle = spawn_detached(|| panic!("daemon body failed")).unwrap();

    // The caller keeps running and the daemon still goes away
    assert!(handle.wait_for_exit(Duration::from_secs(5)));
}
