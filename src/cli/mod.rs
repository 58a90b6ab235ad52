// CLI module - Running the daemon fixture

mod logging;

use crate::config::FixtureConfig;
use crate::error::Result;
use clap::Parser;
use std::path::PathBuf;

pub use logging::init_logging;

/// doublefork - detach into the background and sleep
///
/// Prints `Daemon PID <n>` once the daemon exists. Every flag is optional;
/// with none the fixture runs with its defaults.
#[derive(Parser, Debug)]
#[command(name = "doublefork")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Load settings from a TOML or JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How long the daemon sleeps, in seconds
    #[arg(short, long)]
    sleep_secs: Option<u64>,

    /// Leave the daemon's standard streams attached to the caller's
    #[arg(long)]
    keep_stdio: bool,

    /// Change the daemon's working directory to /
    #[arg(long)]
    chdir_root: bool,

    /// Tracing filter directive (default: off)
    #[arg(long)]
    log_level: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Parse arguments and run the fixture
    pub fn run() -> Result<()> {
        let cli = Cli::parse();
        let config = cli.into_config()?;
        init_logging(&config)?;
        run_fixture(&config)
    }

    /// Merge the optional config file with command-line overrides
    pub fn into_config(self) -> Result<FixtureConfig> {
        let mut config = match self.config {
            Some(ref path) => FixtureConfig::from_file(path)?,
            None => FixtureConfig::default(),
        };

        if let Some(sleep_secs) = self.sleep_secs {
            config.sleep_secs = sleep_secs;
        }
        if self.keep_stdio {
            config.detach_stdio = false;
        }
        if self.chdir_root {
            config.chdir_root = true;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
        if let Some(log_file) = self.log_file {
            config.log_file = Some(log_file);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Daemonize and, in the daemon, run the sleep workload.
///
/// Both parents exit here with status 0; only the daemon returns, once its
/// workload is done.
#[cfg(unix)]
pub fn run_fixture(config: &FixtureConfig) -> Result<()> {
    use crate::daemon::{announce, chdir_root, detach, detach_stdio, Role, SleepWorkload};
    use tracing::{debug, info};

    match detach()? {
        Role::Original { child } => {
            debug!("Handed off to session leader {}", child);
            std::process::exit(0);
        }
        Role::Intermediate { daemon } => {
            announce(&mut std::io::stdout().lock(), daemon)?;
            std::process::exit(0);
        }
        Role::Daemon => {}
    }

    info!("Daemon {} started", std::process::id());

    if config.detach_stdio {
        detach_stdio()?;
    }
    if config.chdir_root {
        chdir_root()?;
    }

    SleepWorkload::new(config.sleep_duration()).run();
    Ok(())
}

#[cfg(not(unix))]
pub fn run_fixture(_config: &FixtureConfig) -> Result<()> {
    Err(crate::error::DetachError::Other(
        "Daemonization is only supported on Unix systems".to_string(),
    ))
}
