//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `triggerd.toml` in the working directory, or at the path in
//! `TRIGGERD_CONFIG`. Every field has a default so the file is optional.
//! Environment variables take precedence over file values.
//!
//! ```toml
//! states = ["red", "hp"]
//!
//! [dispatcher]
//! poll_interval_ms = 100
//!
//! [[templates]]
//! name = "focus"
//! operations = [{ type = "log", params = { message = "focusing" } }]
//!
//! [[scenes]]
//! name = "attack"
//! condition = "[red, 0, 1]"
//! trigger_states = ["red"]
//! cooldown_secs = 1.0
//! template = "focus"
//! operations = [{ type = "sleep", params = { ms = 500 } }]
//! ```

use serde::Deserialize;

use trigger_app::dispatcher::DispatcherConfig;
use trigger_domain::scene::SceneConfig;

/// Default configuration file name.
pub const DEFAULT_PATH: &str = "triggerd.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dispatcher tuning.
    pub dispatcher: DispatcherConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// State trackers to register before scenes are compiled.
    pub states: Vec<String>,
    /// Scene definitions.
    pub scenes: Vec<SceneConfig>,
    /// Reusable operation lists, referenced by `template` in a scene.
    pub templates: Vec<SceneConfig>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "triggerd=info,trigger_app=info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `TRIGGERD_CONFIG` or `triggerd.toml` (if
    /// present) then apply environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable or malformed,
    /// or if the result does not validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("TRIGGERD_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(max_workers) = var("TRIGGERD_MAX_WORKERS").and_then(|val| val.parse().ok()) {
            self.dispatcher.max_workers = max_workers;
        }
        if let Some(interval) = var("TRIGGERD_POLL_INTERVAL_MS").and_then(|val| val.parse().ok()) {
            self.dispatcher.poll_interval_ms = interval;
        }
        if let Some(val) = var("TRIGGERD_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.dispatcher
            .validate()
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        if let Some(state) = self.states.iter().find(|state| state.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "state names must not be blank, got {state:?}"
            )));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
