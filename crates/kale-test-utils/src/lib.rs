//! Testing utilities for the Kale workspace
//!
//! Scripted kernel, recording notifier and prompt, metadata fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use kale_deploy::OverwritePrompt;
use kale_notebook::{Experiment, NotebookMetadata};
use kale_rpc::{
    KernelReply, KernelTransport, Notifier, Report, RpcEnvelope, RpcError, RpcGateway,
    RpcRequest, RpcStatus,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A call received by [`ScriptedKernel`], kwargs decoded
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub function: String,
    pub kwargs: Value,
}

/// Kernel transport replying from per-function queues
///
/// A function with an empty queue gets a transport failure, so an
/// unexpected call shows up as a failed stage.
#[derive(Debug, Default)]
pub struct ScriptedKernel {
    replies: Mutex<HashMap<String, VecDeque<KernelReply>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedKernel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_reply(&self, function: &str, reply: KernelReply) -> &Self {
        self.replies
            .lock()
            .entry(function.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Queue a status-0 reply carrying `result`
    pub fn push_result(&self, function: &str, result: Value) -> &Self {
        let payload = serde_json::to_string(&RpcEnvelope::ok(result)).unwrap();
        self.push_reply(function, KernelReply::ok(format!("'{payload}'")))
    }

    /// Queue a classified remote failure
    pub fn push_remote_error(&self, function: &str, status: RpcStatus, class: &str, message: &str) -> &Self {
        let payload = serde_json::to_string(&RpcEnvelope::error(status, class, message)).unwrap();
        self.push_reply(function, KernelReply::ok(payload))
    }

    /// Queue a reply the kernel failed to execute
    pub fn push_transport_failure(&self, function: &str) -> &Self {
        self.push_reply(function, KernelReply::failed("error", "Traceback: KernelDied"))
    }

    /// Queue a reply whose payload is not JSON
    pub fn push_garbage(&self, function: &str, payload: &str) -> &Self {
        self.push_reply(function, KernelReply::ok(payload))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn functions_called(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.function.clone()).collect()
    }

    pub fn calls_to(&self, function: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.function == function)
            .cloned()
            .collect()
    }

    pub fn call_count(&self, function: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.function == function).count()
    }

    pub fn pending(&self, function: &str) -> usize {
        self.replies.lock().get(function).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl KernelTransport for ScriptedKernel {
    async fn execute(&self, request: &RpcRequest) -> Result<KernelReply, RpcError> {
        self.calls.lock().push(RecordedCall {
            function: request.function.clone(),
            kwargs: request.kwargs()?,
        });
        let reply = self
            .replies
            .lock()
            .get_mut(&request.function)
            .and_then(VecDeque::pop_front);
        Ok(reply.unwrap_or_else(|| {
            KernelReply::failed("error", format!("no scripted reply for {}", request.function))
        }))
    }
}

/// Notifier keeping every report
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    reports: Mutex<Vec<Report>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.reports.lock().iter().map(|r| r.title.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, report: Report) {
        self.reports.lock().push(report);
    }
}

/// Overwrite prompt with a fixed answer
#[derive(Debug)]
pub struct FixedPrompt {
    answer: bool,
    asked: AtomicUsize,
}

impl FixedPrompt {
    pub fn new(answer: bool) -> Arc<Self> {
        Arc::new(Self {
            answer,
            asked: AtomicUsize::new(0),
        })
    }

    pub fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OverwritePrompt for FixedPrompt {
    async fn confirm_overwrite(&self, _pipeline_name: &str) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

/// Gateway over a scripted kernel and a recording notifier
pub fn scripted_gateway() -> (RpcGateway, Arc<ScriptedKernel>, Arc<RecordingNotifier>) {
    let kernel = ScriptedKernel::new();
    let notifier = RecordingNotifier::new();
    let gateway = RpcGateway::new(kernel.clone(), notifier.clone());
    (gateway, kernel, notifier)
}

/// Metadata that passes deploy-time validation
pub fn valid_metadata(pipeline_name: &str) -> NotebookMetadata {
    NotebookMetadata {
        experiment: Experiment::new("e1", "Default"),
        pipeline_name: pipeline_name.to_string(),
        pipeline_description: "test pipeline".to_string(),
        docker_image: "python:3.11".to_string(),
        ..Default::default()
    }
}
