//! Notebook-level pipeline metadata
//!
//! Stored as JSON under [`KALE_NOTEBOOK_METADATA_KEY`]. Field names keep the
//! snake_case spelling the compiler reads on the kernel side.

use crate::error::NotebookError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Notebook metadata key holding [`NotebookMetadata`]
pub const KALE_NOTEBOOK_METADATA_KEY: &str = "kubeflow_notebook";

/// Annotation key marking a volume restored from a snapshot
pub const ROK_ORIGIN_ANNOTATION: &str = "rok/origin";

static PIPELINE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("pipeline name pattern is valid")
});

/// Validate a pipeline name
pub fn validate_pipeline_name(name: &str) -> Result<(), NotebookError> {
    if PIPELINE_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(NotebookError::InvalidPipelineName(name.to_string()))
    }
}

/// Pipeline experiment reference
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Experiment {
    /// Experiment id (`new` for one that does not exist yet)
    #[serde(default)]
    pub id: String,
    /// Experiment name
    #[serde(default)]
    pub name: String,
}

impl Experiment {
    /// Id of the "+ New Experiment" sentinel
    pub const NEW_ID: &'static str = "new";

    /// Create an experiment reference
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// The "+ New Experiment" selector entry
    #[must_use]
    pub fn new_experiment_sentinel() -> Self {
        Self::new(Self::NEW_ID, "+ New Experiment")
    }

    /// Whether this is the "+ New Experiment" sentinel
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.id == Self::NEW_ID
    }
}

/// How a volume is provided to the pipeline steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeType {
    /// Empty volume with dynamic provisioning
    NewPvc,
    /// Clone of a volume mounted on the notebook server
    Clone,
    /// New volume restored from an existing snapshot
    Snap,
    /// Existing claim
    Pvc,
    /// Existing persistent volume (older notebooks)
    Pv,
}

impl VolumeType {
    /// Selector label
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            VolumeType::NewPvc => "Create Empty Volume",
            VolumeType::Clone => "Clone Notebook Volume",
            VolumeType::Snap => "Clone Existing Snapshot",
            VolumeType::Pvc => "Use Existing Volume",
            VolumeType::Pv => "Existing PV",
        }
    }

    /// Whether the user picks a size for this type
    #[inline]
    #[must_use]
    pub fn has_size(&self) -> bool {
        matches!(self, VolumeType::NewPvc | VolumeType::Pv)
    }
}

/// Key/value annotation attached to a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Annotation key
    pub key: String,
    /// Annotation value
    pub value: String,
}

impl Annotation {
    /// Create an annotation
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Binary size unit used by the volume size picker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeUnit {
    /// 1024^3
    Gi,
    /// 1024^2
    Mi,
    /// 1024
    Ki,
    /// Plain bytes
    Bytes,
}

impl SizeUnit {
    /// Units from largest to smallest
    pub const DESCENDING: [SizeUnit; 4] = [SizeUnit::Gi, SizeUnit::Mi, SizeUnit::Ki, SizeUnit::Bytes];

    /// Bytes per unit
    #[inline]
    #[must_use]
    pub fn base(&self) -> u64 {
        match self {
            SizeUnit::Gi => 1024 * 1024 * 1024,
            SizeUnit::Mi => 1024 * 1024,
            SizeUnit::Ki => 1024,
            SizeUnit::Bytes => 1,
        }
    }

    /// Suffix as stored in `size_type`
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeUnit::Gi => "Gi",
            SizeUnit::Mi => "Mi",
            SizeUnit::Ki => "Ki",
            SizeUnit::Bytes => "",
        }
    }
}

impl fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Express a byte count in the largest unit it reaches, rounding up
#[must_use]
pub fn normalize_size(bytes: u64) -> (u64, SizeUnit) {
    let unit = SizeUnit::DESCENDING
        .into_iter()
        .find(|u| bytes >= u.base())
        .unwrap_or(SizeUnit::Bytes);
    (bytes.div_ceil(unit.base()), unit)
}

/// Sizes may arrive fractional from the panel; round them up
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let size = Option::<f64>::deserialize(deserializer)?;
    Ok(size
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(|s| s.ceil() as u64))
}

/// Storage resource attached to the pipeline's steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// How the volume is provided
    #[serde(rename = "type")]
    pub volume_type: VolumeType,
    /// Meaning depends on the type: claim name, volume name, or source
    #[serde(default)]
    pub name: String,
    /// Mount path inside every step
    #[serde(default)]
    pub mount_point: String,
    /// Requested size, in `size_type` units
    #[serde(
        default,
        deserialize_with = "whole_size",
        skip_serializing_if = "Option::is_none"
    )]
    pub size: Option<u64>,
    /// Unit suffix of `size`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_type: Option<String>,
    /// Annotations applied to the created claim
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    /// Whether to snapshot the volume after the run
    #[serde(default)]
    pub snapshot: bool,
    /// Name of that snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,
}

impl VolumeSpec {
    /// Default row added by the volumes panel: 1Gi empty volume
    #[must_use]
    pub fn empty() -> Self {
        Self {
            volume_type: VolumeType::NewPvc,
            name: String::new(),
            mount_point: String::new(),
            size: Some(1),
            size_type: Some(SizeUnit::Gi.as_str().to_string()),
            annotations: Vec::new(),
            snapshot: false,
            snapshot_name: None,
        }
    }

    /// Whether this `new_pvc` is restored from a snapshot
    #[must_use]
    pub fn is_snapshot_restore(&self) -> bool {
        self.volume_type == VolumeType::NewPvc
            && self
                .annotations
                .first()
                .is_some_and(|a| a.key == ROK_ORIGIN_ANNOTATION)
    }
}

/// Pipeline metadata persisted at the notebook level
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotebookMetadata {
    /// Selected experiment
    #[serde(default)]
    pub experiment: Experiment,
    /// Legacy experiment name, kept for older notebooks
    #[serde(default)]
    pub experiment_name: String,
    /// Pipeline name
    #[serde(default)]
    pub pipeline_name: String,
    /// Pipeline description
    #[serde(default)]
    pub pipeline_description: String,
    /// Base image for every step
    #[serde(default)]
    pub docker_image: String,
    /// Volumes attached to every step
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
}

impl NotebookMetadata {
    /// Read metadata from the raw notebook value
    ///
    /// Missing keys fall back to defaults; a missing value yields the default
    /// metadata. Volumes restored from a snapshot load as `snap`.
    pub fn load(raw: Option<&Value>) -> Result<Self, NotebookError> {
        let mut metadata: Self = match raw {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| NotebookError::InvalidMetadata(e.to_string()))?,
        };
        metadata.volumes = metadata.panel_volumes();
        Ok(metadata)
    }

    /// Volumes as shown in the volumes panel
    ///
    /// A `new_pvc` restored from a snapshot is presented as `snap`.
    #[must_use]
    pub fn panel_volumes(&self) -> Vec<VolumeSpec> {
        self.volumes
            .iter()
            .map(|v| {
                if v.is_snapshot_restore() {
                    VolumeSpec {
                        volume_type: VolumeType::Snap,
                        ..v.clone()
                    }
                } else {
                    v.clone()
                }
            })
            .collect()
    }

    /// Experiment name to deploy under, preferring the structured field
    #[must_use]
    pub fn effective_experiment_name(&self) -> &str {
        if self.experiment.name.is_empty() {
            &self.experiment_name
        } else {
            &self.experiment.name
        }
    }

    /// Check the fields a deployment needs
    pub fn validate(&self) -> Result<(), NotebookError> {
        validate_pipeline_name(&self.pipeline_name)?;
        if self.effective_experiment_name().is_empty() {
            return Err(NotebookError::InvalidMetadata(
                "an experiment must be selected".to_string(),
            ));
        }
        Ok(())
    }
}
