use crate::config::FixtureConfig;
use crate::error::{DetachError, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber described by `config`.
///
/// The filter comes from `log_level` only; the environment is not
/// consulted. Once a global subscriber exists, later calls only check
/// that the log file can be opened.
pub fn init_logging(config: &FixtureConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level).map_err(|e| {
        DetachError::ConfigValidationError(format!(
            "Invalid log_level {:?}: {}",
            config.log_level, e
        ))
    })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = match config.log_file {
        Some(ref path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    DetachError::ConfigError(format!(
                        "Failed to open log file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
            if tracing::dispatcher::has_been_set() {
                return Ok(());
            }
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => {
            if tracing::dispatcher::has_been_set() {
                return Ok(());
            }
            builder.with_writer(std::io::stderr).try_init()
        }
    };

    installed.map_err(|e| DetachError::Other(format!("Failed to install logger: {}", e)))
}
