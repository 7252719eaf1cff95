//! Configuration for capture and analysis.

use crate::collector::recorder::DEFAULT_POLL_INTERVAL;
use crate::core::filter::DEFAULT_DIFFERENCE_THRESHOLD;
use crate::core::synchrony::DEFAULT_RESOLUTION;
use crate::core::windowing::DEFAULT_WINDOW_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Restrict onsets to one note; `None` accepts all notes
    pub note_filter: Option<u8>,

    /// Outlier cutoff for intervals and period differences, in seconds
    pub difference_threshold: f64,

    /// Aggregation window width, in seconds
    pub window_size: f64,

    /// Bin width for cross-correlation, in seconds
    pub resolution: f64,

    /// Whether clock ticks appear in the live log
    pub print_clock: bool,

    /// Bounded wait for reads and for the capture supervisor
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            note_filter: None,
            difference_threshold: DEFAULT_DIFFERENCE_THRESHOLD,
            window_size: DEFAULT_WINDOW_SIZE,
            resolution: DEFAULT_RESOLUTION,
            print_clock: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Config {
    /// Load configuration from the default location, or defaults if absent.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("onset-synchrony")
            .join("config.json")
    }

    /// Reject values the analysis cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("difference_threshold", self.difference_threshold)?;
        positive("window_size", self.window_size)?;
        positive("resolution", self.resolution)?;
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "poll_interval",
                message: "must be greater than zero".to_string(),
            });
        }
        if let Some(note) = self.note_filter {
            if note > 127 {
                return Err(ConfigError::Invalid {
                    field: "note_filter",
                    message: format!("{note} is not a MIDI note number"),
                });
            }
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            message: format!("must be a positive number, got {value}"),
        })
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for '{field}': {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Serde support for Duration as whole milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
