use crate::error::{DetachError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Runtime settings for the daemon fixture
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FixtureConfig {
    /// How long the daemon body sleeps (in seconds)
    #[serde(default = "default_sleep_secs")]
    pub sleep_secs: u64,

    /// Redirect the daemon's stdin/stdout/stderr to /dev/null
    #[serde(default = "default_detach_stdio")]
    pub detach_stdio: bool,

    /// Change the daemon's working directory to /
    #[serde(default)]
    pub chdir_root: bool,

    /// Tracing filter directive, e.g. "info" or "doublefork=debug"
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Append log output to this file instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

// Default value functions for serde
fn default_sleep_secs() -> u64 {
    200
}

fn default_detach_stdio() -> bool {
    true
}

fn default_log_level() -> String {
    "off".to_string()
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            sleep_secs: default_sleep_secs(),
            detach_stdio: default_detach_stdio(),
            chdir_root: false,
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

impl FixtureConfig {
    /// Load configuration from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<FixtureConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DetachError::ConfigError(format!("Failed to read config file: {}", e)))?;

        // Determine format based on file extension
        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let config = match extension {
            "toml" => Self::parse_toml(&contents)?,
            "json" => Self::parse_json(&contents)?,
            _ => {
                return Err(DetachError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_toml(contents: &str) -> Result<FixtureConfig> {
        toml::from_str(contents)
            .map_err(|e| DetachError::InvalidConfig(format!("Failed to parse TOML: {}", e)))
    }

    fn parse_json(contents: &str) -> Result<FixtureConfig> {
        serde_json::from_str(contents)
            .map_err(|e| DetachError::InvalidConfig(format!("Failed to parse JSON: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.sleep_secs == 0 {
            return Err(DetachError::ConfigValidationError(
                "sleep_secs must be at least 1".to_string(),
            ));
        }

        EnvFilter::try_new(&self.log_level).map_err(|e| {
            DetachError::ConfigValidationError(format!(
                "Invalid log_level {:?}: {}",
                self.log_level, e
            ))
        })?;

        if let Some(ref log_file) = self.log_file {
            let parent = log_file
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            if !parent.is_dir() {
                return Err(DetachError::ConfigValidationError(format!(
                    "Log file directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        Ok(())
    }

    /// Get the daemon body duration
    pub fn sleep_duration(&self) -> Duration {
        Duration::from_secs(self.sleep_secs)
    }
}
