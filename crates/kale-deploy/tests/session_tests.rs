use kale_deploy::{select_experiment, KaleSession};
use kale_notebook::{Experiment, NotebookMetadata, VolumeType};
use kale_test_utils::scripted_gateway;
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn experiments_end_with_the_new_entry() {
    let (gateway, kernel, _notifier) = scripted_gateway();
    kernel.push_result(
        "kfp.list_experiments",
        json!([{"id": "e1", "name": "Default"}, {"id": "e2", "name": "mnist"}]),
    );
    let session = KaleSession::new(gateway);

    let experiments = session.list_experiments().await;
    let names: Vec<_> = experiments.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Default", "mnist", "+ New Experiment"]);
    assert!(experiments[2].is_new());
}

#[tokio::test]
async fn failed_experiment_query_leaves_only_the_sentinel() {
    let (gateway, kernel, notifier) = scripted_gateway();
    kernel.push_transport_failure("kfp.list_experiments");
    let session = KaleSession::new(gateway);

    let experiments = session.list_experiments().await;
    assert_eq!(experiments, vec![Experiment::new_experiment_sentinel()]);
    assert_eq!(notifier.reports().len(), 1);

    let mut metadata = NotebookMetadata::default();
    metadata.experiment_name = "from-notebook".into();
    let selected = select_experiment(&metadata, &experiments);
    assert!(selected.is_new());
    assert_eq!(selected.name, "from-notebook");
}

#[tokio::test]
async fn resume_path_is_optional() {
    let (gateway, kernel, _notifier) = scripted_gateway();
    kernel.push_result("nb.resume_notebook_path", json!("/home/jovyan/train.ipynb"));
    kernel.push_result("nb.resume_notebook_path", json!(null));
    kernel.push_result("nb.resume_notebook_path", json!(""));
    let session = KaleSession::new(gateway);

    assert_eq!(
        session.resume_notebook_path().await.as_deref(),
        Some("/home/jovyan/train.ipynb")
    );
    assert_eq!(session.resume_notebook_path().await, None);
    assert_eq!(session.resume_notebook_path().await, None);
}

#[tokio::test]
async fn mounted_volume_sizes_are_normalized() {
    let (gateway, kernel, _notifier) = scripted_gateway();
    kernel.push_result(
        "nb.list_volumes",
        json!([{
            "type": "clone",
            "name": "workspace",
            "mount_point": "/home/jovyan",
            "size": 5_368_709_120_u64,
            "annotations": [{"key": "a", "value": "b"}]
        }]),
    );
    let session = KaleSession::new(gateway);

    let volumes = session.mounted_volumes().await.unwrap();
    assert_eq!(volumes.len(), 1);
    assert_eq!(volumes[0].volume_type, VolumeType::Clone);
    assert_eq!(volumes[0].size, Some(5));
    assert_eq!(volumes[0].size_type.as_deref(), Some("Gi"));
    assert!(volumes[0].annotations.is_empty());
}

#[tokio::test]
async fn failed_volume_query_is_none() {
    let (gateway, kernel, _notifier) = scripted_gateway();
    kernel.push_garbage("nb.list_volumes", "oops");
    let session = KaleSession::new(gateway);

    assert!(session.mounted_volumes().await.is_none());
}
