use std::time::Duration;
use tracing::info;

/// Placeholder daemon body: stays alive for a fixed wall-clock duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepWorkload {
    duration: Duration,
}

impl SleepWorkload {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Block the calling thread for the configured duration
    pub fn run(self) {
        info!(
            "Daemon {} sleeping for {}s",
            std::process::id(),
            self.duration.as_secs()
        );
        std::thread::sleep(self.duration);
        info!("Daemon {} finished sleeping", std::process::id());
    }
}
