//! Kale Deploy - notebook pipeline deployments
//!
//! Drives a deployment through its stages:
//! - Snapshots the notebook volumes and waits for the snapshot task
//! - Compiles the notebook into a pipeline package
//! - Uploads it, asking before overwriting an existing pipeline
//! - Starts a run and tracks its status in the background
//!
//! Every deployment gets a handle and a record in the [`DeployRegistry`].
//!
//! # Example
//!
//! ```rust,ignore
//! use kale_deploy::prelude::*;
//!
//! # async fn example(orchestrator: DeployOrchestrator, metadata: kale_notebook::NotebookMetadata) {
//! let request = DeployRequest::new("pipeline.ipynb", metadata).with_mode(DeployMode::Run);
//! if let Ok(outcome) = orchestrator.deploy(request).await {
//!     println!("{} finished as {}", outcome.handle, outcome.state);
//! }
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod progress;
pub mod registry;
pub mod session;
pub mod state_machine;
pub mod types;
pub mod volumes;

pub use config::DeployConfig;
pub use error::{DeployError, StateMachineError};
pub use orchestrator::{DeployOrchestrator, OverwritePrompt};
pub use poller::{PollExit, RunPoller};
pub use progress::{DeployProgress, PipelineStatus, ProgressUpdate};
pub use registry::DeployRegistry;
pub use session::{select_experiment, KaleSession};
pub use state_machine::{allowed_transitions, validate_transition, DeployState, Stage};
pub use types::{DeployHandle, DeployMode, DeployOutcome, DeployRequest};
pub use volumes::{deploy_volumes, panel_mounted_volumes};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running deployments
    pub use crate::{
        DeployConfig, DeployError, DeployHandle, DeployMode, DeployOrchestrator, DeployOutcome,
        DeployProgress, DeployRegistry, DeployRequest, DeployState, OverwritePrompt, Stage,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
