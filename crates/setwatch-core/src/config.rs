//! Configuration types for the settings watcher
//!
//! All timings are expressed in milliseconds so they round-trip cleanly
//! through JSON and environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing configuration for a [`SettingsWatcher`](crate::SettingsWatcher)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Delay between two store lookups
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How often `get_settings_async` re-checks the cache
    #[serde(default = "default_settings_poll_interval_ms")]
    pub settings_poll_interval_ms: u64,

    /// How often `wait_for_startup` re-checks the lifecycle state
    #[serde(default = "default_startup_poll_interval_ms")]
    pub startup_poll_interval_ms: u64,

    /// Upper bound on how long dispose waits for the polling task to stop
    ///
    /// A task still running after this grace period is aborted.
    #[serde(default = "default_dispose_grace_ms")]
    pub dispose_grace_ms: u64,
}

impl WatcherConfig {
    /// Create a configuration with default timings
    pub fn new() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            settings_poll_interval_ms: default_settings_poll_interval_ms(),
            startup_poll_interval_ms: default_startup_poll_interval_ms(),
            dispose_grace_ms: default_dispose_grace_ms(),
        }
    }

    /// Set the store poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the cache re-check interval used by `get_settings_async`
    pub fn with_settings_poll_interval(mut self, interval: Duration) -> Self {
        self.settings_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the state re-check interval used by `wait_for_startup`
    pub fn with_startup_poll_interval(mut self, interval: Duration) -> Self {
        self.startup_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the dispose grace period
    pub fn with_dispose_grace(mut self, grace: Duration) -> Self {
        self.dispose_grace_ms = grace.as_millis() as u64;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settings_poll_interval(&self) -> Duration {
        Duration::from_millis(self.settings_poll_interval_ms)
    }

    pub fn startup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.startup_poll_interval_ms)
    }

    pub fn dispose_grace(&self) -> Duration {
        Duration::from_millis(self.dispose_grace_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.poll_interval_ms == 0 {
            return Err(crate::Error::config("poll_interval_ms must be > 0"));
        }
        if self.settings_poll_interval_ms == 0 {
            return Err(crate::Error::config(
                "settings_poll_interval_ms must be > 0",
            ));
        }
        if self.startup_poll_interval_ms == 0 {
            return Err(crate::Error::config("startup_poll_interval_ms must be > 0"));
        }
        if self.dispose_grace_ms == 0 {
            return Err(crate::Error::config("dispose_grace_ms must be > 0"));
        }
        Ok(())
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_settings_poll_interval_ms() -> u64 {
    100
}

fn default_startup_poll_interval_ms() -> u64 {
    10
}

fn default_dispose_grace_ms() -> u64 {
    10_000
}
