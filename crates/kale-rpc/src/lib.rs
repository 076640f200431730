//! Kale RPC - kernel gateway for remote pipeline functions
//!
//! The gateway:
//! - Encodes keyword arguments as base64 JSON
//! - Executes the call through a [`KernelTransport`]
//! - Unwraps the transport status and the `{status, result, ...}` envelope
//! - Classifies failures and reports them through a [`Notifier`]
//!
//! # Example
//!
//! ```rust,ignore
//! use kale_rpc::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let gateway = RpcGateway::new(
//!     Arc::new(ProcessTransport::new("python3")),
//!     Arc::new(TracingNotifier),
//! );
//! if let Some(experiments) = gateway.call_typed(&ListExperiments {}).await {
//!     println!("{} experiments", experiments.len());
//! }
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod envelope;
pub mod error;
pub mod function;
pub mod gateway;
pub mod process;
pub mod report;
pub mod transport;

pub use envelope::{RpcEnvelope, RpcRequest, RpcStatus};
pub use error::{FailureClass, RpcError};
pub use function::{
    CompileNotebook, CompiledPipeline, GetRun, GetTask, ListExperiments, ListVolumes,
    PipelineRef, RemoteFunction, ResumeNotebookPath, RunInfo, RunPipeline, SnapshotNotebook,
    SnapshotTask, TaskEvent, TaskResult, UploadOutcome, UploadPipeline,
};
pub use gateway::{failure_report, RpcGateway};
pub use process::ProcessTransport;
pub use report::{Notifier, Report, TracingNotifier};
pub use transport::{KernelReply, KernelTransport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for calling remote functions
    pub use crate::{
        KernelTransport, ListExperiments, Notifier, ProcessTransport, RemoteFunction, Report,
        RpcError, RpcGateway, TracingNotifier,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
