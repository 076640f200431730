use async_trait::async_trait;
use kale_deploy::orchestrator::{TITLE_FAILURE, TITLE_SUCCESS};
use kale_deploy::prelude::*;
use kale_deploy::{PipelineStatus, PollExit};
use kale_notebook::{VolumeSpec, VolumeType};
use kale_test_utils::{scripted_gateway, valid_metadata, FixedPrompt, RecordingNotifier, ScriptedKernel};
use mockall::mock;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Notify;

mock! {
    Prompt {}

    #[async_trait]
    impl OverwritePrompt for Prompt {
        async fn confirm_overwrite(&self, pipeline_name: &str) -> bool;
    }
}

const BASE: &str = "https://kf.example.com";

fn orchestrator(
    prompt: Arc<dyn OverwritePrompt>,
) -> (DeployOrchestrator, Arc<ScriptedKernel>, Arc<RecordingNotifier>) {
    let (gateway, kernel, notifier) = scripted_gateway();
    let orchestrator = DeployOrchestrator::new(
        gateway,
        Arc::new(DeployRegistry::new()),
        prompt,
        DeployConfig::default(),
    );
    (orchestrator, kernel, notifier)
}

fn compiled() -> Value {
    json!({
        "pipeline_package_path": "/x.yaml",
        "pipeline_metadata": {"pipeline_name": "p"}
    })
}

fn finished_task() -> Value {
    json!({
        "id": "t1",
        "status": "success",
        "progress": 100,
        "bucket": "notebooks",
        "result": {"event": {"object": "nb", "version": "v1"}}
    })
}

fn script_snapshot(kernel: &ScriptedKernel) {
    kernel.push_result("rok.snapshot_notebook", json!({"id": "t1", "status": "running", "progress": 0}));
    kernel.push_result("rok.get_task", json!({"id": "t1", "status": "running", "progress": 50}));
    kernel.push_result("rok.get_task", finished_task());
}

fn request(mode: DeployMode) -> DeployRequest {
    DeployRequest::new("/home/jovyan/pipeline.ipynb", valid_metadata("p")).with_mode(mode)
}

#[tokio::test(start_paused = true)]
async fn run_deployment_end_to_end() {
    let (orchestrator, kernel, _notifier) = orchestrator(FixedPrompt::new(true));
    script_snapshot(&kernel);
    kernel.push_result("nb.compile_notebook", compiled());
    kernel.push_result("kfp.run_pipeline", json!({"id": "r1", "status": null}));
    kernel.push_result("kfp.get_run", json!({"id": "r1", "status": "Succeeded"}));

    let outcome = orchestrator.deploy(request(DeployMode::Run)).await.unwrap();
    assert!(outcome.succeeded());
    assert_eq!(outcome.run.as_ref().unwrap().id, "r1");

    let record = orchestrator.registry().get(outcome.handle).unwrap();
    assert_eq!(record.snapshot_label().as_deref(), Some("Done"));
    assert_eq!(
        record.snapshot_link(BASE).as_deref(),
        Some("https://kf.example.com/rok/buckets/notebooks/files/nb/versions/v1")
    );
    assert!(record.show_run);
    assert!(!record.show_upload);
    assert_eq!(record.run_label(), "View");

    let exit = orchestrator.wait_for_run(outcome.handle).await;
    assert!(matches!(exit, Some(PollExit::Terminal(_))));
    assert_eq!(orchestrator.registry().get(outcome.handle).unwrap().run_label(), "Done");

    let polls = kernel.calls_to("kfp.get_run");
    assert_eq!(polls.len(), 1);
    assert_eq!(polls[0].kwargs, json!({"run_id": "r1"}));
    assert_eq!(
        kernel.functions_called(),
        vec![
            "rok.snapshot_notebook",
            "rok.get_task",
            "rok.get_task",
            "nb.compile_notebook",
            "kfp.run_pipeline",
            "kfp.get_run",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn clone_volumes_point_at_the_snapshot() {
    let (orchestrator, kernel, _notifier) = orchestrator(FixedPrompt::new(true));
    script_snapshot(&kernel);
    kernel.push_result("nb.compile_notebook", compiled());

    let mut metadata = valid_metadata("p");
    metadata.volumes = vec![VolumeSpec {
        volume_type: VolumeType::Clone,
        name: "workspace".into(),
        mount_point: "/home/jovyan".into(),
        ..VolumeSpec::empty()
    }];
    let request = DeployRequest::new("nb.ipynb", metadata).with_mode(DeployMode::Compile);
    assert!(orchestrator.deploy(request).await.unwrap().succeeded());

    let compile = &kernel.calls_to("nb.compile_notebook")[0];
    let volume = &compile.kwargs["notebook_metadata_overrides"]["volumes"][0];
    assert_eq!(volume["type"], "new_pvc");
    assert_eq!(
        volume["annotations"][0],
        json!({"key": "rok/origin", "value": "notebooks/nb/v1"})
    );
}

#[tokio::test(start_paused = true)]
async fn compile_only_reports_package_path() {
    let (orchestrator, kernel, notifier) = orchestrator(FixedPrompt::new(true));
    kernel.push_result("nb.compile_notebook", compiled());

    let outcome = orchestrator
        .deploy(request(DeployMode::Compile).with_snapshot(false).with_debug(true))
        .await
        .unwrap();

    assert_eq!(outcome.state, DeployState::Succeeded);
    assert_eq!(kernel.functions_called(), vec!["nb.compile_notebook"]);
    assert_eq!(kernel.calls()[0].kwargs["debug"], json!(true));
    let report = &notifier.reports()[0];
    assert_eq!(report.title, TITLE_SUCCESS);
    assert_eq!(report.lines, vec!["Pipeline saved successfully at /x.yaml"]);
}

#[tokio::test(start_paused = true)]
async fn invalid_metadata_makes_no_remote_calls() {
    let (orchestrator, kernel, notifier) = orchestrator(FixedPrompt::new(true));

    let outcome = orchestrator
        .deploy(DeployRequest::new("nb.ipynb", valid_metadata("Bad_Name")).with_mode(DeployMode::Run))
        .await
        .unwrap();

    assert_eq!(outcome.state, DeployState::Failed(Stage::Validate));
    assert!(kernel.calls().is_empty());
    assert_eq!(notifier.titles(), vec![TITLE_FAILURE]);
    assert_eq!(
        orchestrator.registry().get(outcome.handle).unwrap().state,
        DeployState::Failed(Stage::Validate)
    );
}

#[tokio::test(start_paused = true)]
async fn snapshot_failure_stops_before_compile() {
    let (orchestrator, kernel, notifier) = orchestrator(FixedPrompt::new(true));
    kernel.push_result("rok.snapshot_notebook", json!({"id": "t1", "status": "running"}));
    kernel.push_result("rok.get_task", json!({"id": "t1", "status": "error", "progress": 30}));

    let outcome = orchestrator.deploy(request(DeployMode::Run)).await.unwrap();

    assert_eq!(outcome.state, DeployState::Failed(Stage::Snapshot));
    assert_eq!(kernel.call_count("nb.compile_notebook"), 0);
    assert_eq!(notifier.titles(), vec![TITLE_FAILURE]);
    let record = orchestrator.registry().get(outcome.handle).unwrap();
    assert_eq!(record.snapshot_label().as_deref(), Some("Failed"));
}

#[tokio::test(start_paused = true)]
async fn snapshot_polling_is_bounded() {
    let (gateway, kernel, _notifier) = scripted_gateway();
    let orchestrator = DeployOrchestrator::new(
        gateway,
        Arc::new(DeployRegistry::new()),
        FixedPrompt::new(true),
        DeployConfig::default().with_max_snapshot_polls(3),
    );
    kernel.push_result("rok.snapshot_notebook", json!({"id": "t1", "status": "running"}));
    for _ in 0..5 {
        kernel.push_result("rok.get_task", json!({"id": "t1", "status": "running", "progress": 10}));
    }

    let outcome = orchestrator.deploy(request(DeployMode::Compile)).await.unwrap();

    assert_eq!(outcome.state, DeployState::Failed(Stage::Snapshot));
    assert_eq!(kernel.call_count("rok.get_task"), 3);
}

#[tokio::test(start_paused = true)]
async fn compile_failure_stops_before_upload() {
    let (orchestrator, kernel, notifier) = orchestrator(FixedPrompt::new(true));
    script_snapshot(&kernel);
    kernel.push_remote_error(
        "nb.compile_notebook",
        kale_rpc::RpcStatus::ExecutionError,
        "ValueError",
        "bad step",
    );

    let outcome = orchestrator.deploy(request(DeployMode::Upload)).await.unwrap();

    assert_eq!(outcome.state, DeployState::Failed(Stage::Compile));
    assert!(outcome.compiled.is_none());
    assert_eq!(kernel.call_count("kfp.upload_pipeline"), 0);
    assert_eq!(notifier.titles(), vec![kale_rpc::gateway::TITLE_REMOTE]);
}

#[tokio::test(start_paused = true)]
async fn run_failure_spawns_no_poller() {
    let (orchestrator, kernel, _notifier) = orchestrator(FixedPrompt::new(true));
    kernel.push_result("nb.compile_notebook", compiled());
    kernel.push_transport_failure("kfp.run_pipeline");

    let outcome = orchestrator
        .deploy(request(DeployMode::Run).with_snapshot(false))
        .await
        .unwrap();

    assert_eq!(outcome.state, DeployState::Failed(Stage::Run));
    assert_eq!(orchestrator.active_pollers(), 0);
    assert_eq!(orchestrator.wait_for_run(outcome.handle).await, None);
}

#[tokio::test(start_paused = true)]
async fn upload_reports_pipeline_name() {
    let (orchestrator, kernel, notifier) = orchestrator(FixedPrompt::new(true));
    kernel.push_result("nb.compile_notebook", compiled());
    kernel.push_result(
        "kfp.upload_pipeline",
        json!({"already_exists": false, "pipeline": {"id": "p1", "name": "p"}}),
    );

    let outcome = orchestrator
        .deploy(request(DeployMode::Upload).with_snapshot(false))
        .await
        .unwrap();

    assert!(outcome.succeeded());
    let record = orchestrator.registry().get(outcome.handle).unwrap();
    assert!(record.show_upload);
    assert_eq!(record.upload_label(), "Done");
    assert_eq!(
        record.upload_link(BASE).as_deref(),
        Some("https://kf.example.com/_/pipeline/#/pipelines/details/p1")
    );
    assert_eq!(
        notifier.reports()[0].lines,
        vec!["Pipeline p uploaded successfully"]
    );
}

#[tokio::test(start_paused = true)]
async fn declined_overwrite_cancels_without_second_upload() {
    let mut prompt = MockPrompt::new();
    prompt
        .expect_confirm_overwrite()
        .withf(|name| name.to_string() == "p")
        .times(1)
        .returning(|_| false);
    let (orchestrator, kernel, notifier) = orchestrator(Arc::new(prompt));
    kernel.push_result("nb.compile_notebook", compiled());
    kernel.push_result("kfp.upload_pipeline", json!({"already_exists": true}));

    let outcome = orchestrator
        .deploy(request(DeployMode::Upload).with_snapshot(false))
        .await
        .unwrap();

    assert_eq!(outcome.state, DeployState::Canceled);
    assert_eq!(kernel.call_count("kfp.upload_pipeline"), 1);
    let record = orchestrator.registry().get(outcome.handle).unwrap();
    assert_eq!(record.pipeline, Some(PipelineStatus::Declined));
    assert_eq!(record.upload_label(), "Canceled");
    assert!(notifier.reports().is_empty());
}

#[tokio::test(start_paused = true)]
async fn confirmed_overwrite_uploads_again() {
    let prompt = FixedPrompt::new(true);
    let (orchestrator, kernel, _notifier) = orchestrator(prompt.clone());
    kernel.push_result("nb.compile_notebook", compiled());
    kernel.push_result("kfp.upload_pipeline", json!({"already_exists": true}));
    kernel.push_result(
        "kfp.upload_pipeline",
        json!({"already_exists": false, "pipeline": {"id": "p2", "name": "p"}}),
    );

    let outcome = orchestrator
        .deploy(request(DeployMode::Upload).with_snapshot(false))
        .await
        .unwrap();

    assert!(outcome.succeeded());
    assert_eq!(prompt.times_asked(), 1);
    let uploads = kernel.calls_to("kfp.upload_pipeline");
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].kwargs["overwrite"], json!(false));
    assert_eq!(uploads[1].kwargs["overwrite"], json!(true));
    assert_eq!(uploads[1].kwargs["pipeline_metadata"], json!({"pipeline_name": "p"}));
}

struct GatedPrompt {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl OverwritePrompt for GatedPrompt {
    async fn confirm_overwrite(&self, _pipeline_name: &str) -> bool {
        self.entered.notify_one();
        self.release.notified().await;
        false
    }
}

#[tokio::test(start_paused = true)]
async fn second_trigger_is_ignored_while_initiating() {
    let prompt = Arc::new(GatedPrompt {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let (orchestrator, kernel, _notifier) = orchestrator(prompt.clone());
    let orchestrator = Arc::new(orchestrator);
    kernel.push_result("nb.compile_notebook", compiled());
    kernel.push_result("kfp.upload_pipeline", json!({"already_exists": true}));

    let first = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move {
            orchestrator
                .deploy(request(DeployMode::Upload).with_snapshot(false))
                .await
        }
    });
    prompt.entered.notified().await;

    assert!(orchestrator.is_busy());
    assert!(matches!(
        orchestrator.deploy(request(DeployMode::Compile)).await,
        Err(DeployError::Busy)
    ));
    assert_eq!(orchestrator.registry().len(), 1);

    prompt.release.notify_one();
    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome.state, DeployState::Canceled);
    assert!(!orchestrator.is_busy());
    assert_eq!(kernel.call_count("nb.compile_notebook"), 1);
}

#[tokio::test(start_paused = true)]
async fn handles_are_sequential_across_deployments() {
    let (orchestrator, kernel, _notifier) = orchestrator(FixedPrompt::new(true));
    kernel.push_result("nb.compile_notebook", compiled());
    kernel.push_result("nb.compile_notebook", compiled());

    let first = orchestrator
        .deploy(request(DeployMode::Compile).with_snapshot(false))
        .await
        .unwrap();
    let second = orchestrator
        .deploy(request(DeployMode::Compile).with_snapshot(false))
        .await
        .unwrap();

    assert_eq!(first.handle, DeployHandle(1));
    assert_eq!(second.handle, DeployHandle(2));
}
