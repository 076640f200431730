//! Deployment request and outcome types

use crate::state_machine::DeployState;
use kale_notebook::NotebookMetadata;
use kale_rpc::{CompiledPipeline, RunInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of one deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeployHandle(pub u64);

impl DeployHandle {
    /// Raw handle value
    #[inline]
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeployHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stages a deployment goes through after compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// Compile only
    #[default]
    Compile,
    /// Compile and upload
    Upload,
    /// Compile and start a run
    Run,
}

impl DeployMode {
    /// Whether the upload row is shown for this mode
    #[inline]
    #[must_use]
    pub fn shows_upload(&self) -> bool {
        matches!(self, Self::Upload)
    }

    /// Whether the run row is shown for this mode
    #[inline]
    #[must_use]
    pub fn shows_run(&self) -> bool {
        matches!(self, Self::Run)
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compile => "compile",
            Self::Upload => "upload",
            Self::Run => "run",
        })
    }
}

impl FromStr for DeployMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compile" => Ok(Self::Compile),
            "upload" => Ok(Self::Upload),
            "run" => Ok(Self::Run),
            other => Err(format!("unknown deploy mode '{other}' (compile|upload|run)")),
        }
    }
}

/// Everything a deployment needs from the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Notebook path as the kernel sees it
    pub notebook_path: String,
    /// Metadata overriding what is stored in the notebook
    pub metadata: NotebookMetadata,
    /// Stages after compilation
    pub mode: DeployMode,
    /// Compile with debug output
    pub debug: bool,
    /// Snapshot the notebook volumes first
    pub snapshot: bool,
}

impl DeployRequest {
    /// Create a request with snapshotting enabled
    #[must_use]
    pub fn new(notebook_path: impl Into<String>, metadata: NotebookMetadata) -> Self {
        Self {
            notebook_path: notebook_path.into(),
            metadata,
            mode: DeployMode::default(),
            debug: false,
            snapshot: true,
        }
    }

    /// With deploy mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: DeployMode) -> Self {
        self.mode = mode;
        self
    }

    /// With debug compilation
    #[inline]
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// With or without the snapshot stage
    #[inline]
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: bool) -> Self {
        self.snapshot = snapshot;
        self
    }
}

/// Result of one deployment once its blocking stages resolved
///
/// Run polling may still be going on in the background.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployOutcome {
    /// Deployment handle
    pub handle: DeployHandle,
    /// Final state of the blocking stages
    pub state: DeployState,
    /// Compiled package, if compilation succeeded
    pub compiled: Option<CompiledPipeline>,
    /// Created run, if one was started
    pub run: Option<RunInfo>,
}

impl DeployOutcome {
    /// Whether the deployment succeeded
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == DeployState::Succeeded
    }
}
