//! Notebook session helpers
//!
//! Queries the panel issues when a notebook is opened: where the server was
//! started from, which experiments exist, and which volumes are mounted.

use crate::volumes::panel_mounted_volumes;
use kale_notebook::{Experiment, NotebookMetadata, VolumeSpec};
use kale_rpc::{ListExperiments, ListVolumes, ResumeNotebookPath, RpcGateway};

/// Session-level remote queries
#[derive(Clone)]
pub struct KaleSession {
    gateway: RpcGateway,
}

impl KaleSession {
    /// Create a session over a gateway
    #[must_use]
    pub fn new(gateway: RpcGateway) -> Self {
        Self { gateway }
    }

    /// Notebook the server was started to resume, if any
    pub async fn resume_notebook_path(&self) -> Option<String> {
        self.gateway
            .call_typed(&ResumeNotebookPath {})
            .await
            .flatten()
            .filter(|p| !p.is_empty())
    }

    /// Known experiments, followed by the "+ New Experiment" entry
    ///
    /// A failed query yields just the sentinel.
    pub async fn list_experiments(&self) -> Vec<Experiment> {
        let mut experiments = self
            .gateway
            .call_typed(&ListExperiments {})
            .await
            .unwrap_or_default();
        experiments.push(Experiment::new_experiment_sentinel());
        experiments
    }

    /// Volumes mounted on the notebook server, sizes normalized
    ///
    /// `None` when the query failed, in which case cloning notebook volumes
    /// is not offered.
    pub async fn mounted_volumes(&self) -> Option<Vec<VolumeSpec>> {
        self.gateway
            .call_typed(&ListVolumes {})
            .await
            .map(panel_mounted_volumes)
    }
}

/// Experiment to preselect for `metadata`
///
/// Matches by id, then by name or legacy `experiment_name`. Without a match,
/// or when the match is the sentinel, the first entry is used; if that is the
/// sentinel too, it carries the name stored in the metadata.
#[must_use]
pub fn select_experiment(metadata: &NotebookMetadata, experiments: &[Experiment]) -> Experiment {
    let matched = experiments.iter().find(|e| {
        (!metadata.experiment.id.is_empty() && e.id == metadata.experiment.id)
            || (!metadata.experiment.name.is_empty() && e.name == metadata.experiment.name)
            || (!metadata.experiment_name.is_empty() && e.name == metadata.experiment_name)
    });

    match matched {
        Some(e) if !e.is_new() => e.clone(),
        _ => {
            let Some(first) = experiments.first() else {
                return Experiment::new_experiment_sentinel();
            };
            let mut selected = first.clone();
            if selected.is_new() {
                selected.name = metadata.effective_experiment_name().to_string();
            }
            selected
        }
    }
}
