//! Closed set of typed remote functions
//!
//! Each request type names its remote function and response type, and may
//! reject itself locally before anything is encoded.

use crate::error::RpcError;
use kale_notebook::{Experiment, NotebookMetadata, VolumeSpec};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A remote function callable through the gateway
pub trait RemoteFunction: Serialize + Send + Sync {
    /// Remote name, `<module>.<function>`
    const NAME: &'static str;

    /// Decoded `result` of a successful call
    type Response: DeserializeOwned + Send;

    /// Local checks run before encoding
    fn validate(&self) -> Result<(), RpcError> {
        Ok(())
    }
}

/// Decode a JSON `null` the same as a missing key
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn require(field: &str, value: &str) -> Result<(), RpcError> {
    if value.trim().is_empty() {
        Err(RpcError::Validation(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

/// `nb.resume_notebook_path`: notebook the server was started from
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResumeNotebookPath {}

impl RemoteFunction for ResumeNotebookPath {
    const NAME: &'static str = "nb.resume_notebook_path";
    type Response = Option<String>;
}

/// `nb.list_volumes`: volumes mounted on the notebook server
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListVolumes {}

impl RemoteFunction for ListVolumes {
    const NAME: &'static str = "nb.list_volumes";
    type Response = Vec<VolumeSpec>;
}

/// `nb.compile_notebook`
#[derive(Debug, Clone, Serialize)]
pub struct CompileNotebook {
    /// Notebook to compile
    pub source_notebook_path: String,
    /// Metadata taking precedence over what is stored in the notebook
    pub notebook_metadata_overrides: NotebookMetadata,
    /// Compile with debug output
    pub debug: bool,
}

/// Compiled pipeline package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPipeline {
    /// Path of the compiled package, on the kernel's filesystem
    pub pipeline_package_path: String,
    /// Metadata the compiler resolved; passed back verbatim on upload/run
    #[serde(default)]
    pub pipeline_metadata: Value,
}

impl CompiledPipeline {
    /// Pipeline name from the resolved metadata
    #[must_use]
    pub fn pipeline_name(&self) -> Option<&str> {
        self.pipeline_metadata.get("pipeline_name")?.as_str()
    }
}

impl RemoteFunction for CompileNotebook {
    const NAME: &'static str = "nb.compile_notebook";
    type Response = CompiledPipeline;

    fn validate(&self) -> Result<(), RpcError> {
        require("source_notebook_path", &self.source_notebook_path)
    }
}

/// `kfp.list_experiments`
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListExperiments {}

impl RemoteFunction for ListExperiments {
    const NAME: &'static str = "kfp.list_experiments";
    type Response = Vec<Experiment>;
}

/// `kfp.upload_pipeline`
#[derive(Debug, Clone, Serialize)]
pub struct UploadPipeline {
    /// Compiled package path
    pub pipeline_package_path: String,
    /// Resolved metadata from compilation
    pub pipeline_metadata: Value,
    /// Replace an existing pipeline with the same name
    pub overwrite: bool,
}

/// Uploaded pipeline reference
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineRef {
    /// Pipeline id
    #[serde(default)]
    pub id: String,
    /// Pipeline name
    #[serde(default)]
    pub name: String,
}

/// Result of an upload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UploadOutcome {
    /// A pipeline with the same name exists and nothing was uploaded
    #[serde(default)]
    pub already_exists: bool,
    /// Uploaded pipeline
    #[serde(default)]
    pub pipeline: Option<PipelineRef>,
}

impl RemoteFunction for UploadPipeline {
    const NAME: &'static str = "kfp.upload_pipeline";
    type Response = UploadOutcome;

    fn validate(&self) -> Result<(), RpcError> {
        require("pipeline_package_path", &self.pipeline_package_path)
    }
}

/// `kfp.run_pipeline`
#[derive(Debug, Clone, Serialize)]
pub struct RunPipeline {
    /// Resolved metadata from compilation
    pub pipeline_metadata: Value,
    /// Compiled package path
    pub pipeline_package_path: String,
}

/// Pipeline run as reported by the remote
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunInfo {
    /// Run id
    #[serde(default)]
    pub id: String,
    /// Run name
    #[serde(default)]
    pub name: String,
    /// Run status; `None` until the remote knows it
    #[serde(default)]
    pub status: Option<String>,
}

impl RunInfo {
    /// Whether the status is definitive
    ///
    /// An unknown status, `Running` and `Pending` keep the run in flight.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self.status.as_deref(), None | Some("Running" | "Pending"))
    }
}

impl RemoteFunction for RunPipeline {
    const NAME: &'static str = "kfp.run_pipeline";
    type Response = RunInfo;

    fn validate(&self) -> Result<(), RpcError> {
        require("pipeline_package_path", &self.pipeline_package_path)
    }
}

/// `kfp.get_run`
#[derive(Debug, Clone, Serialize)]
pub struct GetRun {
    /// Run id from [`RunPipeline`]
    pub run_id: String,
}

impl RemoteFunction for GetRun {
    const NAME: &'static str = "kfp.get_run";
    type Response = RunInfo;

    fn validate(&self) -> Result<(), RpcError> {
        require("run_id", &self.run_id)
    }
}

/// `rok.snapshot_notebook`
#[derive(Debug, Clone, Default, Serialize)]
pub struct SnapshotNotebook {}

impl RemoteFunction for SnapshotNotebook {
    const NAME: &'static str = "rok.snapshot_notebook";
    type Response = SnapshotTask;
}

/// `rok.get_task`
#[derive(Debug, Clone, Serialize)]
pub struct GetTask {
    /// Task id from [`SnapshotNotebook`]
    pub task_id: String,
}

impl RemoteFunction for GetTask {
    const NAME: &'static str = "rok.get_task";
    type Response = SnapshotTask;

    fn validate(&self) -> Result<(), RpcError> {
        require("task_id", &self.task_id)
    }
}

/// Snapshot object version produced by a finished task
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Object name
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    /// Object version
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
}

/// Result of a finished snapshot task
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskResult {
    /// Produced object version
    #[serde(default)]
    pub event: Option<TaskEvent>,
}

/// Long-running snapshot task
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SnapshotTask {
    /// Task id
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// `success`, `error`, `canceled`, or an in-flight status
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    /// Completion percentage, 0-100, possibly fractional
    #[serde(default)]
    pub progress: Option<f64>,
    /// Bucket holding the snapshot
    #[serde(default, deserialize_with = "null_as_default")]
    pub bucket: String,
    /// Present once the task finished
    #[serde(default)]
    pub result: Option<TaskResult>,
}

impl SnapshotTask {
    /// Terminal success status
    pub const SUCCESS: &'static str = "success";
    /// Terminal error status
    pub const ERROR: &'static str = "error";
    /// Terminal canceled status
    pub const CANCELED: &'static str = "canceled";

    /// Whether the task reached a terminal status
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status.as_str(),
            Self::SUCCESS | Self::ERROR | Self::CANCELED
        )
    }

    /// Whether the task succeeded
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == Self::SUCCESS
    }

    /// Completion rounded to a whole percent, 0 when unknown
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn percent(&self) -> u8 {
        match self.progress {
            Some(p) if p.is_finite() => p.round().clamp(0.0, 100.0) as u8,
            _ => 0,
        }
    }

    /// Produced object version, once available
    #[must_use]
    pub fn event(&self) -> Option<&TaskEvent> {
        self.result.as_ref()?.event.as_ref()
    }

    /// `<bucket>/<object>/<version>` origin of the snapshot
    #[must_use]
    pub fn origin(&self) -> Option<String> {
        self.event()
            .map(|e| format!("{}/{}/{}", self.bucket, e.object, e.version))
    }
}
