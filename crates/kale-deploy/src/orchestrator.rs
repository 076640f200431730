//! Deployment orchestrator
//!
//! Sequences the stages of one deployment:
//! 1. snapshot the notebook volumes and wait for the task
//! 2. point `clone` volumes at the snapshot
//! 3. compile the notebook
//! 4. upload (asking before overwriting) or start a run, or stop
//!
//! Stages run strictly in sequence and any failed remote call ends the
//! deployment with no retry. Only one deployment may be initiating at a
//! time; run polling continues in the background after `deploy` returns.

use crate::config::DeployConfig;
use crate::error::DeployError;
use crate::poller::{PollExit, RunPoller};
use crate::progress::{PipelineStatus, ProgressUpdate};
use crate::registry::DeployRegistry;
use crate::state_machine::{validate_transition, DeployState, Stage};
use crate::types::{DeployHandle, DeployMode, DeployOutcome, DeployRequest};
use crate::volumes::deploy_volumes;
use async_trait::async_trait;
use kale_rpc::{
    CompileNotebook, CompiledPipeline, GetTask, Report, RpcGateway, RunInfo, RunPipeline,
    SnapshotNotebook, SnapshotTask, UploadOutcome, UploadPipeline,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Title of success reports
pub const TITLE_SUCCESS: &str = "Operation Successful";
/// Title of local failure reports
pub const TITLE_FAILURE: &str = "Operation Failed";

/// Asks the user whether an existing pipeline may be replaced
#[async_trait]
pub trait OverwritePrompt: Send + Sync {
    /// Resolve to `true` to overwrite `pipeline_name`
    async fn confirm_overwrite(&self, pipeline_name: &str) -> bool;
}

/// Clears the busy flag when the initiating stages resolve
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// State of one deployment as it advances
struct Tracker<'a> {
    registry: &'a DeployRegistry,
    handle: DeployHandle,
    state: DeployState,
    compiled: Option<CompiledPipeline>,
    run: Option<RunInfo>,
}

impl Tracker<'_> {
    fn advance(&mut self, to: DeployState, update: ProgressUpdate) -> Result<(), DeployError> {
        validate_transition(self.state, to)?;
        self.state = to;
        self.registry.upsert(
            self.handle,
            ProgressUpdate {
                state: Some(to),
                ..update
            },
        );
        info!(handle = %self.handle, state = %to, "deploy state changed");
        Ok(())
    }

    fn update(&self, update: ProgressUpdate) {
        self.registry.upsert(self.handle, update);
    }

    fn fail(&mut self, stage: Stage) -> Result<(), DeployError> {
        warn!(handle = %self.handle, %stage, "deployment failed");
        self.advance(DeployState::Failed(stage), ProgressUpdate::default())
    }

    fn outcome(self) -> DeployOutcome {
        DeployOutcome {
            handle: self.handle,
            state: self.state,
            compiled: self.compiled,
            run: self.run,
        }
    }
}

/// Drives deployments and owns their records
pub struct DeployOrchestrator {
    gateway: RpcGateway,
    registry: Arc<DeployRegistry>,
    prompt: Arc<dyn OverwritePrompt>,
    config: DeployConfig,
    poller: RunPoller,
    busy: AtomicBool,
}

impl DeployOrchestrator {
    /// Create an orchestrator
    #[must_use]
    pub fn new(
        gateway: RpcGateway,
        registry: Arc<DeployRegistry>,
        prompt: Arc<dyn OverwritePrompt>,
        config: DeployConfig,
    ) -> Self {
        let poller = RunPoller::new(
            gateway.clone(),
            Arc::clone(&registry),
            config.run_poll_interval(),
            config.max_run_polls,
        );
        Self {
            gateway,
            registry,
            prompt,
            config,
            poller,
            busy: AtomicBool::new(false),
        }
    }

    /// Deploy registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<DeployRegistry> {
        &self.registry
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Whether a deployment is initiating
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Run a deployment
    ///
    /// Fails with [`DeployError::Busy`], doing nothing, when another
    /// deployment is still initiating. Otherwise resolves once the blocking
    /// stages finished; stage failures have already been reported through
    /// the notifier and show in the outcome's state.
    pub async fn deploy(&self, request: DeployRequest) -> Result<DeployOutcome, DeployError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("deploy trigger ignored, a deployment is already initiating");
            return Err(DeployError::Busy);
        }
        let _busy = BusyGuard(&self.busy);

        let handle = self.registry.next_handle();
        info!(%handle, mode = %request.mode, notebook = %request.notebook_path, "deployment started");

        let mut tracker = Tracker {
            registry: &self.registry,
            handle,
            state: DeployState::Idle,
            compiled: None,
            run: None,
        };
        tracker.update(ProgressUpdate::default());

        if let Err(err) = self.execute(&mut tracker, &request).await {
            error!(%handle, error = %err, "deployment aborted");
        }
        Ok(tracker.outcome())
    }

    /// Dismiss a deploy record
    ///
    /// Run polling for it keeps going; its updates are dropped.
    pub fn dismiss(&self, handle: DeployHandle) -> bool {
        self.registry.mark_deleted(handle)
    }

    /// Stop run polling for a deployment
    pub fn cancel_run_polling(&self, handle: DeployHandle) -> bool {
        self.poller.cancel(handle)
    }

    /// Wait for run polling of a deployment to stop
    pub async fn wait_for_run(&self, handle: DeployHandle) -> Option<PollExit> {
        self.poller.join(handle).await
    }

    /// Number of run pollers still active
    #[must_use]
    pub fn active_pollers(&self) -> usize {
        self.poller.active()
    }

    async fn execute(
        &self,
        tracker: &mut Tracker<'_>,
        request: &DeployRequest,
    ) -> Result<(), DeployError> {
        if let Err(err) = request.metadata.validate() {
            self.notify(Report::new(TITLE_FAILURE, vec![err.to_string()]))
                .await;
            return tracker.fail(Stage::Validate);
        }

        let origin = if request.snapshot {
            tracker.advance(DeployState::Snapshotting, ProgressUpdate::default())?;
            match self.snapshot(tracker).await {
                Some(task) => task.origin(),
                None => return tracker.fail(Stage::Snapshot),
            }
        } else {
            None
        };

        let mut metadata = request.metadata.clone();
        metadata.volumes = deploy_volumes(&metadata.volumes, origin.as_deref());

        tracker.advance(DeployState::Compiling, ProgressUpdate::default())?;
        let compile = CompileNotebook {
            source_notebook_path: request.notebook_path.clone(),
            notebook_metadata_overrides: metadata,
            debug: request.debug,
        };
        let Some(compiled) = self.gateway.call_typed(&compile).await else {
            return tracker.fail(Stage::Compile);
        };
        tracker.compiled = Some(compiled.clone());

        match request.mode {
            DeployMode::Compile => {
                tracker.advance(DeployState::Done, ProgressUpdate::default())?;
                self.notify(Report::new(
                    TITLE_SUCCESS,
                    vec![format!(
                        "Pipeline saved successfully at {}",
                        compiled.pipeline_package_path
                    )],
                ))
                .await;
                tracker.advance(DeployState::Succeeded, ProgressUpdate::default())
            }
            DeployMode::Upload => self.upload(tracker, &compiled).await,
            DeployMode::Run => self.run(tracker, &compiled).await,
        }
    }

    /// Take the snapshot and wait for the task; `None` when it did not succeed
    async fn snapshot(&self, tracker: &Tracker<'_>) -> Option<SnapshotTask> {
        let task = self.gateway.call_typed(&SnapshotNotebook {}).await?;
        tracker.update(ProgressUpdate::task(task.clone()));

        let poll = GetTask { task_id: task.id };
        let interval = self.config.snapshot_poll_interval();
        let mut polls = 0_u32;
        let task = loop {
            let task = self.gateway.call_typed(&poll).await?;
            polls += 1;
            tracker.update(ProgressUpdate::task(task.clone()));
            if task.is_terminal() {
                break task;
            }
            if polls >= self.config.max_snapshot_polls {
                self.notify(Report::new(
                    TITLE_FAILURE,
                    vec![
                        format!("Snapshot task {} did not finish", poll.task_id),
                        format!("Gave up after {polls} status checks"),
                    ],
                ))
                .await;
                return None;
            }
            tokio::time::sleep(interval).await;
        };

        if task.is_success() {
            info!(handle = %tracker.handle, task = %task.id, "snapshot taken");
            Some(task)
        } else {
            self.notify(Report::new(
                TITLE_FAILURE,
                vec![
                    format!("Snapshot task {} ended with status '{}'", task.id, task.status),
                ],
            ))
            .await;
            None
        }
    }

    async fn upload(
        &self,
        tracker: &mut Tracker<'_>,
        compiled: &CompiledPipeline,
    ) -> Result<(), DeployError> {
        tracker.advance(
            DeployState::Uploading,
            ProgressUpdate::default().with_show_upload(true),
        )?;

        let mut request = UploadPipeline {
            pipeline_package_path: compiled.pipeline_package_path.clone(),
            pipeline_metadata: compiled.pipeline_metadata.clone(),
            overwrite: false,
        };
        let Some(mut outcome) = self.gateway.call_typed(&request).await else {
            return tracker.fail(Stage::Upload);
        };

        if outcome.already_exists {
            let name = compiled.pipeline_name().unwrap_or_default().to_string();
            if !self.prompt.confirm_overwrite(&name).await {
                info!(handle = %tracker.handle, pipeline = %name, "overwrite declined");
                return tracker.advance(
                    DeployState::Canceled,
                    ProgressUpdate::default().with_pipeline(PipelineStatus::Declined),
                );
            }
            request.overwrite = true;
            outcome = match self.gateway.call_typed(&request).await {
                Some(outcome) => outcome,
                None => return tracker.fail(Stage::Upload),
            };
        }

        self.notify(Report::new(
            TITLE_SUCCESS,
            vec![upload_message(compiled, &outcome)],
        ))
        .await;
        tracker.advance(
            DeployState::Succeeded,
            ProgressUpdate::default().with_pipeline(PipelineStatus::Uploaded(outcome)),
        )
    }

    async fn run(
        &self,
        tracker: &mut Tracker<'_>,
        compiled: &CompiledPipeline,
    ) -> Result<(), DeployError> {
        tracker.advance(
            DeployState::Running,
            ProgressUpdate::default().with_show_run(true),
        )?;

        let request = RunPipeline {
            pipeline_metadata: compiled.pipeline_metadata.clone(),
            pipeline_package_path: compiled.pipeline_package_path.clone(),
        };
        let Some(run) = self.gateway.call_typed(&request).await else {
            return tracker.fail(Stage::Run);
        };

        tracker.update(ProgressUpdate::run(run.clone()));
        if run.is_terminal() {
            info!(handle = %tracker.handle, run_id = %run.id, "run already finished");
        } else {
            self.poller.spawn(tracker.handle, run.id.clone());
        }
        tracker.run = Some(run);
        tracker.advance(DeployState::Succeeded, ProgressUpdate::default())
    }

    async fn notify(&self, report: Report) {
        self.gateway.notifier().notify(report).await;
    }
}

fn upload_message(compiled: &CompiledPipeline, outcome: &UploadOutcome) -> String {
    let name = outcome
        .pipeline
        .as_ref()
        .map(|p| p.name.as_str())
        .filter(|n| !n.is_empty())
        .or_else(|| compiled.pipeline_name())
        .unwrap_or("pipeline");
    format!("Pipeline {name} uploaded successfully")
}
