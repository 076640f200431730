use kale_rpc::gateway::{TITLE_DECODE, TITLE_REMOTE, TITLE_TRANSPORT};
use kale_rpc::{FailureClass, GetRun, GetTask, ListExperiments, RpcError, RpcStatus};
use kale_test_utils::scripted_gateway;
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn ok_reply_resolves_to_result() {
    let (gateway, kernel, notifier) = scripted_gateway();
    kernel.push_result("kfp.get_run", json!({"id": "r1", "status": "Running"}));

    let result = gateway.call("kfp.get_run", json!({"run_id": "r1"})).await;
    assert_eq!(result, Some(json!({"id": "r1", "status": "Running"})));
    assert_eq!(kernel.calls()[0].kwargs, json!({"run_id": "r1"}));
    assert!(notifier.reports().is_empty());
}

#[tokio::test]
async fn transport_failure_reports_and_resolves_none() {
    let (gateway, kernel, notifier) = scripted_gateway();
    kernel.push_transport_failure("nb.list_volumes");

    assert_eq!(gateway.call("nb.list_volumes", json!({})).await, None);
    let reports = notifier.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].title, TITLE_TRANSPORT);
    assert_eq!(reports[0].lines[0], "Function Call: nb.list_volumes()");
    assert_eq!(reports[0].lines[1], "Status: error");
}

#[tokio::test]
async fn decode_failure_includes_raw_payload() {
    let (gateway, kernel, notifier) = scripted_gateway();
    kernel.push_garbage("kfp.list_experiments", "<html>502</html>");

    assert!(gateway.call_typed(&ListExperiments {}).await.is_none());
    let report = &notifier.reports()[0];
    assert_eq!(report.title, TITLE_DECODE);
    assert_eq!(report.lines.last().unwrap(), "Response data: <html>502</html>");
}

#[tokio::test]
async fn remote_errors_are_classified() {
    let (gateway, kernel, notifier) = scripted_gateway();
    kernel.push_remote_error("rok.snapshot_notebook", RpcStatus::ImportError, "ImportError", "no rok");
    kernel.push_remote_error("rok.snapshot_notebook", RpcStatus::Unknown(5), "Weird", "?");

    let err = gateway
        .try_call_value("rok.snapshot_notebook", &json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.class(), FailureClass::RemoteImport);

    assert_eq!(gateway.call("rok.snapshot_notebook", json!({})).await, None);
    let report = &notifier.reports()[0];
    assert_eq!(report.title, TITLE_REMOTE);
    assert_eq!(report.lines[1], "Status: 5 (UnknownError)");
    assert_eq!(report.lines[2], "Type: Weird");
}

#[tokio::test]
async fn typed_response_shape_mismatch_is_decode_failure() {
    let (gateway, kernel, _notifier) = scripted_gateway();
    kernel.push_result("kfp.get_run", json!([1, 2, 3]));

    let err = gateway
        .try_call(&GetRun {
            run_id: "r1".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Decode { .. }));
}

#[tokio::test]
async fn invalid_request_never_reaches_kernel() {
    let (gateway, kernel, notifier) = scripted_gateway();

    let result = gateway
        .call_typed(&GetRun {
            run_id: String::new(),
        })
        .await;
    assert!(result.is_none());
    assert!(kernel.calls().is_empty());
    assert_eq!(notifier.titles(), vec!["Invalid request"]);
}

#[tokio::test]
async fn try_call_does_not_report() {
    let (gateway, kernel, notifier) = scripted_gateway();
    kernel.push_transport_failure("kfp.get_run");

    let err = gateway
        .try_call(&GetRun {
            run_id: "r1".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.class(), FailureClass::Transport);
    assert!(notifier.reports().is_empty());
}

#[tokio::test]
async fn task_reply_with_null_fields_decodes() {
    let (gateway, kernel, notifier) = scripted_gateway();
    kernel.push_result(
        "rok.get_task",
        json!({"id": "t1", "status": "running", "progress": 42, "bucket": null, "result": null}),
    );

    let task = gateway
        .call_typed(&GetTask { task_id: "t1".into() })
        .await
        .unwrap();
    assert_eq!(task.id, "t1");
    assert_eq!(task.bucket, "");
    assert_eq!(task.percent(), 42);
    assert!(!task.is_terminal());
    assert!(notifier.reports().is_empty());
}

#[tokio::test]
async fn task_reply_with_fractional_progress_decodes() {
    let (gateway, kernel, notifier) = scripted_gateway();
    kernel.push_result(
        "rok.get_task",
        json!({"id": null, "status": "running", "progress": 42.5, "bucket": "notebooks"}),
    );

    let task = gateway
        .call_typed(&GetTask { task_id: "t1".into() })
        .await
        .unwrap();
    assert_eq!(task.id, "");
    assert_eq!(task.progress, Some(42.5));
    assert_eq!(task.percent(), 43);
    assert!(notifier.reports().is_empty());
}
