use thiserror::Error;

#[cfg(unix)]
use crate::daemon::ForkStage;
#[cfg(unix)]
use nix::errno::Errno;

/// Main error type for daemonization
#[derive(Debug, Error)]
pub enum DetachError {
    // Process creation errors
    #[cfg(unix)]
    #[error("fork #{stage} failed: {} ({})", errno_code(.errno), errno_desc(.errno))]
    Fork { stage: ForkStage, errno: Errno },

    #[cfg(unix)]
    #[error("setsid failed: {} ({})", errno_code(.0), errno_desc(.0))]
    Setsid(Errno),

    #[error("Daemon handoff failed: {0}")]
    Handoff(String),

    #[error("Failed to detach standard streams: {0}")]
    Stdio(String),

    #[error("Signal error: {0}")]
    SignalError(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl DetachError {
    /// Exit status the binary reports for this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}

#[cfg(unix)]
fn errno_code(errno: &Errno) -> i32 {
    *errno as i32
}

#[cfg(unix)]
fn errno_desc(errno: &Errno) -> &'static str {
    errno.desc()
}

/// Result type alias for daemonization operations
pub type Result<T> = std::result::Result<T, DetachError>;
