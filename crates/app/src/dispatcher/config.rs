//! Dispatcher tuning.

use std::time::Duration;

use serde::Deserialize;

use trigger_domain::error::ConfigError;

/// Smallest pool that keeps one worker free for event handlers while the
/// poll loop and the task it awaits each hold one.
pub const MIN_WORKERS: usize = 3;

/// Configuration for the trigger dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Sleep between two polls of the continuous scene when nothing started,
    /// in milliseconds.
    pub poll_interval_ms: u64,
    /// Sleep while an event-triggered evaluation is in flight, in
    /// milliseconds.
    pub backoff_ms: u64,
    /// Size of the worker pool shared by the poll loop, event handlers and
    /// tasks.
    pub max_workers: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            backoff_ms: 20,
            max_workers: 4,
        }
    }
}

impl DispatcherConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero interval or a pool
    /// smaller than [`MIN_WORKERS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "dispatcher.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.backoff_ms == 0 {
            return Err(ConfigError::Invalid(
                "dispatcher.backoff_ms must be positive".to_string(),
            ));
        }
        if self.max_workers < MIN_WORKERS {
            return Err(ConfigError::Invalid(format!(
                "dispatcher.max_workers must be at least {MIN_WORKERS}, got {}",
                self.max_workers
            )));
        }
        Ok(())
    }
}
