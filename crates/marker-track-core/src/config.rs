//! Engine timing configuration.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

/// Configuration rejected before the engine starts.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    #[error("tracking_lost_timeout must be a positive finite number of seconds (got {0})")]
    InvalidTimeout(f64),
    #[error("min_publish_interval must be a non-negative finite number of seconds (got {0})")]
    InvalidPublishInterval(f64),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

fn default_tracking_lost_timeout() -> f64 {
    2.0
}

fn default_min_publish_interval() -> f64 {
    2.0
}

/// Timing knobs of the reconciliation engine.
///
/// The two values are independent. With a timeout shorter than the publish
/// interval a lost marker can stay reported as tracked for up to one interval
/// past its real loss.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Seconds without a detection after which a marker counts as lost.
    #[serde(default = "default_tracking_lost_timeout")]
    pub tracking_lost_timeout: f64,
    /// Minimum seconds between two published snapshots.
    #[serde(default = "default_min_publish_interval")]
    pub min_publish_interval: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tracking_lost_timeout: default_tracking_lost_timeout(),
            min_publish_interval: default_min_publish_interval(),
        }
    }
}

impl TrackerConfig {
    pub fn with_tracking_lost_timeout(mut self, seconds: f64) -> Self {
        self.tracking_lost_timeout = seconds;
        self
    }

    pub fn with_min_publish_interval(mut self, seconds: f64) -> Self {
        self.min_publish_interval = seconds;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeout = self.tracking_lost_timeout;
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(ConfigError::InvalidTimeout(timeout));
        }
        let interval = self.min_publish_interval;
        if !interval.is_finite() || interval < 0.0 {
            return Err(ConfigError::InvalidPublishInterval(interval));
        }
        Ok(())
    }

    /// Load and validate a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
