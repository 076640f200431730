//! Subprocess-backed kernel transport
//!
//! Runs each request in a fresh Python interpreter that has the `kale`
//! package installed, calling `kale.rpc.run.run(function, kwargs_encoded)`
//! and printing its JSON reply.

use crate::envelope::RpcRequest;
use crate::error::RpcError;
use crate::transport::{KernelReply, KernelTransport};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

const RUN_SNIPPET: &str = "import sys\n\
from kale.rpc.run import run\n\
print(run(sys.argv[1], sys.argv[2]))\n";

/// Transport status reported when the interpreter exits non-zero
pub const STATUS_PROCESS_FAILED: &str = "error";

/// Kernel transport that shells out to a Python interpreter
#[derive(Debug, Clone)]
pub struct ProcessTransport {
    python: PathBuf,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl Default for ProcessTransport {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl ProcessTransport {
    /// Create a transport for the given interpreter
    #[must_use]
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            working_dir: None,
            env: Vec::new(),
        }
    }

    /// Run the interpreter from this directory (builder pattern)
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable (builder pattern)
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn command(&self, request: &RpcRequest) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.arg("-c")
            .arg(RUN_SNIPPET)
            .arg(&request.function)
            .arg(&request.kwargs_encoded)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

#[async_trait]
impl KernelTransport for ProcessTransport {
    async fn execute(&self, request: &RpcRequest) -> Result<KernelReply, RpcError> {
        let mut cmd = self.command(request);
        debug!(function = %request.function, python = %self.python.display(), "Running kernel call");

        let output = cmd.output().await?;
        if output.status.success() {
            Ok(KernelReply::ok(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(
                function = %request.function,
                code = ?output.status.code(),
                "Kernel call exited with failure"
            );
            Ok(KernelReply::failed(
                STATUS_PROCESS_FAILED,
                stderr.trim().to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_passes_function_and_kwargs() {
        let transport = ProcessTransport::new("/usr/bin/python3")
            .with_working_dir("/tmp")
            .with_env("KALE_DEBUG", "1");
        let request = RpcRequest::new("kfp.get_run", &json!({"run_id": "r1"})).unwrap();
        let cmd = transport.command(&request);
        let std_cmd = cmd.as_std();

        let args: Vec<_> = std_cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args[0], "-c");
        assert!(args[1].contains("kale.rpc.run"));
        assert_eq!(args[2], "kfp.get_run");
        assert_eq!(args[3], request.kwargs_encoded);
        assert_eq!(std_cmd.get_current_dir(), Some(std::path::Path::new("/tmp")));
    }

    #[tokio::test]
    async fn missing_interpreter_is_io_error() {
        let transport = ProcessTransport::new("/nonexistent/kale-python");
        let request = RpcRequest::new("nb.list_volumes", &()).unwrap();
        let err = transport.execute(&request).await.unwrap_err();
        assert!(matches!(err, RpcError::Io(_)));
    }
}
