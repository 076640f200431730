//! RPC gateway
//!
//! Marshals a function name and keyword arguments to the kernel, unwraps the
//! two-layer reply, and classifies failures. [`RpcGateway::call`] never
//! fails: any failure is reported through the [`Notifier`] and resolves to
//! `None`, which tells the caller to abort or branch.

use crate::envelope::{RpcEnvelope, RpcRequest};
use crate::error::RpcError;
use crate::function::RemoteFunction;
use crate::report::{Notifier, Report};
use crate::transport::KernelTransport;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// Title of a transport failure report
pub const TITLE_TRANSPORT: &str = "Kernel failed during code execution";
/// Title of a decode failure report
pub const TITLE_DECODE: &str = "Failed to parse response as JSON";
/// Title of a remote failure report
pub const TITLE_REMOTE: &str = "An error has occurred";
/// Title of a local validation failure report
pub const TITLE_VALIDATION: &str = "Invalid request";

/// Gateway to remote functions executed by the kernel
#[derive(Clone)]
pub struct RpcGateway {
    transport: Arc<dyn KernelTransport>,
    notifier: Arc<dyn Notifier>,
}

impl RpcGateway {
    /// Create a gateway
    #[must_use]
    pub fn new(transport: Arc<dyn KernelTransport>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            transport,
            notifier,
        }
    }

    /// Notifier receiving failure reports
    #[inline]
    #[must_use]
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Call a function by name, returning the classified error
    pub async fn try_call_value(&self, function: &str, kwargs: &Value) -> Result<Value, RpcError> {
        let request = RpcRequest::new(function, kwargs)?;
        debug!(function, "rpc call");

        let reply = self.transport.execute(&request).await?;
        if !reply.is_ok() {
            return Err(RpcError::Transport {
                status: reply.status,
                output: reply.data,
            });
        }
        RpcEnvelope::parse(&reply.data)?.into_result()
    }

    /// Call a function by name
    ///
    /// Resolves to the remote `result`, or `None` after reporting the
    /// failure.
    pub async fn call(&self, function: &str, kwargs: Value) -> Option<Value> {
        match self.try_call_value(function, &kwargs).await {
            Ok(value) => Some(value),
            Err(err) => {
                self.report(function, &kwargs, &err).await;
                None
            }
        }
    }

    /// Call a typed remote function, returning the classified error
    ///
    /// Nothing is reported; callers that only log failures use this.
    pub async fn try_call<F: RemoteFunction>(&self, request: &F) -> Result<F::Response, RpcError> {
        request.validate()?;
        let kwargs = serde_json::to_value(request)?;
        let result = self.try_call_value(F::NAME, &kwargs).await?;
        serde_json::from_value(result.clone()).map_err(|e| RpcError::decode(e, result.to_string()))
    }

    /// Call a typed remote function
    ///
    /// Resolves to the decoded response, or `None` after reporting the
    /// failure.
    pub async fn call_typed<F: RemoteFunction>(&self, request: &F) -> Option<F::Response> {
        match self.try_call(request).await {
            Ok(response) => Some(response),
            Err(err) => {
                let kwargs = serde_json::to_value(request).unwrap_or(Value::Null);
                self.report(F::NAME, &kwargs, &err).await;
                None
            }
        }
    }

    async fn report(&self, function: &str, kwargs: &Value, err: &RpcError) {
        error!(function, class = ?err.class(), error = %err, "rpc call failed");
        self.notifier
            .notify(failure_report(function, kwargs, err))
            .await;
    }
}

/// `Function Call: name(k=v, ...)` header line
#[must_use]
pub fn call_line(function: &str, kwargs: &Value) -> String {
    let args = kwargs
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    format!("Function Call: {function}({args})")
}

/// User-visible report for a failed call
#[must_use]
pub fn failure_report(function: &str, kwargs: &Value, err: &RpcError) -> Report {
    let header = call_line(function, kwargs);
    match err {
        RpcError::Transport { status, output } => Report::new(
            TITLE_TRANSPORT,
            vec![header, format!("Status: {status}"), format!("Output: {output}")],
        ),
        RpcError::Io(io) => Report::new(
            TITLE_TRANSPORT,
            vec![header, "Status: error".to_string(), format!("Output: {io}")],
        ),
        RpcError::Decode { message, payload } => Report::new(
            TITLE_DECODE,
            vec![
                header,
                format!("Error: {message}"),
                format!("Response data: {payload}"),
            ],
        ),
        RpcError::Remote {
            status,
            class,
            message,
        } => Report::new(
            TITLE_REMOTE,
            vec![
                header,
                format!("Status: {} ({})", status.code(), status.name()),
                format!("Type: {}", class.as_deref().unwrap_or("")),
                format!("Message: {}", message.as_deref().unwrap_or("")),
            ],
        ),
        RpcError::Validation(_) | RpcError::Encode(_) => {
            Report::new(TITLE_VALIDATION, vec![header, format!("Error: {err}")])
        }
    }
}
