//! Deployment configuration
//!
//! Loaded from the `[deploy]` table of a TOML file, or built in code.

use crate::error::DeployError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Deployment configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Interval between snapshot task polls, in milliseconds
    pub snapshot_poll_interval_ms: u64,
    /// Maximum number of snapshot task polls before giving up
    pub max_snapshot_polls: u32,
    /// Interval between run status polls, in milliseconds
    pub run_poll_interval_ms: u64,
    /// Maximum number of run status polls
    pub max_run_polls: u32,
    /// Base URL of the cluster UI, used for record links
    pub ui_base_url: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            snapshot_poll_interval_ms: 1_000,
            max_snapshot_polls: 3_600,
            run_poll_interval_ms: 5_000,
            max_run_polls: 8_640,
            ui_base_url: String::new(),
        }
    }
}

impl DeployConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With snapshot poll interval
    #[inline]
    #[must_use]
    pub fn with_snapshot_poll_interval(mut self, interval: Duration) -> Self {
        self.snapshot_poll_interval_ms = millis(interval);
        self
    }

    /// With run poll interval
    #[inline]
    #[must_use]
    pub fn with_run_poll_interval(mut self, interval: Duration) -> Self {
        self.run_poll_interval_ms = millis(interval);
        self
    }

    /// With maximum snapshot polls
    #[inline]
    #[must_use]
    pub fn with_max_snapshot_polls(mut self, max: u32) -> Self {
        self.max_snapshot_polls = max;
        self
    }

    /// With maximum run polls
    #[inline]
    #[must_use]
    pub fn with_max_run_polls(mut self, max: u32) -> Self {
        self.max_run_polls = max;
        self
    }

    /// With UI base URL
    #[inline]
    #[must_use]
    pub fn with_ui_base_url(mut self, url: impl Into<String>) -> Self {
        self.ui_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Snapshot poll interval
    #[inline]
    #[must_use]
    pub fn snapshot_poll_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_poll_interval_ms)
    }

    /// Run poll interval
    #[inline]
    #[must_use]
    pub fn run_poll_interval(&self) -> Duration {
        Duration::from_millis(self.run_poll_interval_ms)
    }

    /// Reject values that would make polling spin or never start
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.snapshot_poll_interval_ms == 0 || self.run_poll_interval_ms == 0 {
            return Err(DeployError::Config(
                "poll intervals must be greater than zero".to_string(),
            ));
        }
        if self.max_snapshot_polls == 0 || self.max_run_polls == 0 {
            return Err(DeployError::Config(
                "maximum poll counts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse the `[deploy]` table of a TOML document
    ///
    /// A document without the table yields the defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self, DeployError> {
        #[derive(Deserialize)]
        struct File {
            #[serde(default)]
            deploy: DeployConfig,
        }

        let file: File = toml::from_str(toml)?;
        file.deploy.validate()?;
        Ok(file.deploy)
    }

    /// Load configuration from a TOML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DeployError> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_toml_str(&raw)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
