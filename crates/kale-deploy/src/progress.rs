//! Deploy records and their display helpers
//!
//! A [`DeployProgress`] is an immutable snapshot; the registry replaces it
//! wholesale on every [`ProgressUpdate`].

use crate::state_machine::DeployState;
use crate::types::DeployHandle;
use kale_rpc::{RunInfo, SnapshotTask, UploadOutcome};

/// Label shown while a stage has no result yet
pub const IN_PROGRESS: &str = "In progress";

/// Upload stage result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Pipeline uploaded
    Uploaded(UploadOutcome),
    /// The user declined to overwrite an existing pipeline
    Declined,
}

/// Progress of one deployment
#[derive(Debug, Clone, PartialEq)]
pub struct DeployProgress {
    /// Deployment handle
    pub handle: DeployHandle,
    /// Current state
    pub state: DeployState,
    /// Latest snapshot task status
    pub task: Option<SnapshotTask>,
    /// Upload result; `None` while pending
    pub pipeline: Option<PipelineStatus>,
    /// Latest run status
    pub run: Option<RunInfo>,
    /// Upload row visible
    pub show_upload: bool,
    /// Run row visible
    pub show_run: bool,
    /// Dismissed by the user
    pub deleted: bool,
}

impl DeployProgress {
    /// Empty record
    #[must_use]
    pub fn new(handle: DeployHandle) -> Self {
        Self {
            handle,
            state: DeployState::Idle,
            task: None,
            pipeline: None,
            run: None,
            show_upload: false,
            show_run: false,
            deleted: false,
        }
    }

    /// Copy of this record with `update` merged in
    #[must_use]
    pub fn merged(&self, update: ProgressUpdate) -> Self {
        let mut next = self.clone();
        if let Some(state) = update.state {
            next.state = state;
        }
        if let Some(task) = update.task {
            next.task = Some(task);
        }
        if let Some(pipeline) = update.pipeline {
            next.pipeline = Some(pipeline);
        }
        if let Some(run) = update.run {
            next.run = Some(run);
        }
        if let Some(show) = update.show_upload {
            next.show_upload = show;
        }
        if let Some(show) = update.show_run {
            next.show_run = show;
        }
        next
    }

    /// Snapshot row label, once a task exists
    #[must_use]
    pub fn snapshot_label(&self) -> Option<String> {
        let task = self.task.as_ref()?;
        let label = match task.status.as_str() {
            SnapshotTask::ERROR => "Failed".to_string(),
            SnapshotTask::CANCELED => "Canceled".to_string(),
            _ if task.progress.is_some_and(|p| p >= 100.0) => "Done".to_string(),
            _ => format!("{}%", task.percent()),
        };
        Some(label)
    }

    /// Link to the snapshot object version
    #[must_use]
    pub fn snapshot_link(&self, base_url: &str) -> Option<String> {
        let task = self.task.as_ref()?;
        let event = task.event()?;
        Some(format!(
            "{base_url}/rok/buckets/{}/files/{}/versions/{}",
            task.bucket, event.object, event.version
        ))
    }

    /// Upload row label
    #[must_use]
    pub fn upload_label(&self) -> &'static str {
        match &self.pipeline {
            Some(PipelineStatus::Uploaded(_)) => "Done",
            Some(PipelineStatus::Declined) => "Canceled",
            None => IN_PROGRESS,
        }
    }

    /// Link to the uploaded pipeline
    #[must_use]
    pub fn upload_link(&self, base_url: &str) -> Option<String> {
        let Some(PipelineStatus::Uploaded(outcome)) = &self.pipeline else {
            return None;
        };
        let id = &outcome.pipeline.as_ref()?.id;
        (!id.is_empty()).then(|| format!("{base_url}/_/pipeline/#/pipelines/details/{id}"))
    }

    /// Run row label
    #[must_use]
    pub fn run_label(&self) -> String {
        let Some(run) = &self.run else {
            return IN_PROGRESS.to_string();
        };
        match run.status.as_deref() {
            None | Some("Running" | "Pending") => "View".to_string(),
            Some(status @ ("Terminating" | "Failed")) => status.to_string(),
            Some(_) => "Done".to_string(),
        }
    }

    /// Link to the run
    #[must_use]
    pub fn run_link(&self, base_url: &str) -> Option<String> {
        let run = self.run.as_ref()?;
        (!run.id.is_empty()).then(|| format!("{base_url}/_/pipeline/#/runs/details/{}", run.id))
    }
}

/// Partial update merged into a deploy record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressUpdate {
    /// New state
    pub state: Option<DeployState>,
    /// New snapshot task status
    pub task: Option<SnapshotTask>,
    /// Upload result
    pub pipeline: Option<PipelineStatus>,
    /// New run status
    pub run: Option<RunInfo>,
    /// Upload row visibility
    pub show_upload: Option<bool>,
    /// Run row visibility
    pub show_run: Option<bool>,
}

impl ProgressUpdate {
    /// State change
    #[must_use]
    pub fn state(state: DeployState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Snapshot task status
    #[must_use]
    pub fn task(task: SnapshotTask) -> Self {
        Self {
            task: Some(task),
            ..Self::default()
        }
    }

    /// Run status
    #[must_use]
    pub fn run(run: RunInfo) -> Self {
        Self {
            run: Some(run),
            ..Self::default()
        }
    }

    /// With upload result
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: PipelineStatus) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// With upload row visibility
    #[must_use]
    pub fn with_show_upload(mut self, show: bool) -> Self {
        self.show_upload = Some(show);
        self
    }

    /// With run row visibility
    #[must_use]
    pub fn with_show_run(mut self, show: bool) -> Self {
        self.show_run = Some(show);
        self
    }
}
