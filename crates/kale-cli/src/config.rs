//! CLI configuration file

use anyhow::{Context, Result};
use kale_deploy::DeployConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of `kale.toml`
///
/// ```toml
/// python = "/opt/conda/bin/python"
///
/// [deploy]
/// run_poll_interval_ms = 2000
/// ui_base_url = "https://kubeflow.example.com"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct KaleConfig {
    /// Interpreter running the kernel-side RPC module
    pub(crate) python: PathBuf,
    /// Working directory of the interpreter
    pub(crate) working_dir: Option<PathBuf>,
    /// Deployment settings
    pub(crate) deploy: DeployConfig,
}

impl Default for KaleConfig {
    fn default() -> Self {
        Self {
            python: PathBuf::from("python3"),
            working_dir: None,
            deploy: DeployConfig::default(),
        }
    }
}

impl KaleConfig {
    pub(crate) fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("invalid configuration")?;
        config.deploy.validate()?;
        Ok(config)
    }

    /// Load `path`, or the defaults when no file was given
    pub(crate) async fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("in {}", path.display()))
    }

    /// With interpreter
    #[must_use]
    pub(crate) fn with_python(mut self, python: impl Into<PathBuf>) -> Self {
        self.python = python.into();
        self
    }
}
