// Daemon module - Detaching a process from its terminal and parent

pub mod daemonize;
pub mod handle;
pub mod spawn;
pub mod workload;

pub use daemonize::{announce, announcement, chdir_root, detach, detach_stdio, ForkStage, Role};
pub use handle::ProcessHandle;
pub use spawn::spawn_detached;
pub use workload::SleepWorkload;
