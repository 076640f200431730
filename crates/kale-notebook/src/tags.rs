//! Cell tag codec
//!
//! A code cell carries a flat, ordered list of string tags:
//! - at most one step identity: a reserved role name, or `block:<name>`
//! - zero or more dependency edges: `prev:<name>`
//!
//! Anything else in the list is ignored by [`decode`].

use crate::error::NotebookError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix of a step identity tag
pub const BLOCK_PREFIX: &str = "block:";

/// Prefix of a dependency edge tag
pub const PREV_PREFIX: &str = "prev:";

static STEP_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([_a-z][_a-z0-9]*)?$").expect("step name pattern is valid")
});

/// Fixed, non-step cell categories with special compile-time treatment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReservedRole {
    /// Prepended to every step
    Imports,
    /// Prepended to every step, after `imports`
    Functions,
    /// Variables become pipeline parameters
    PipelineParameters,
    /// Variables become pipeline metrics
    PipelineMetrics,
    /// Excluded from every step
    Skip,
}

impl ReservedRole {
    /// All reserved roles, in selector order
    pub const ALL: [ReservedRole; 5] = [
        ReservedRole::Imports,
        ReservedRole::Functions,
        ReservedRole::PipelineParameters,
        ReservedRole::PipelineMetrics,
        ReservedRole::Skip,
    ];

    /// Tag spelling of the role
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservedRole::Imports => "imports",
            ReservedRole::Functions => "functions",
            ReservedRole::PipelineParameters => "pipeline-parameters",
            ReservedRole::PipelineMetrics => "pipeline-metrics",
            ReservedRole::Skip => "skip",
        }
    }

    /// Look up a role by its tag spelling
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == name)
    }

    /// Editor help text for the role
    #[must_use]
    pub fn help_text(&self) -> &'static str {
        match self {
            ReservedRole::Imports => {
                "The code in this cell will be pre-pended to every step of the pipeline."
            }
            ReservedRole::Functions => {
                "The code in this cell will be pre-pended to every step of the pipeline, \
                 after `imports`."
            }
            ReservedRole::PipelineParameters => {
                "The variables in this cell will be transformed into pipeline parameters, \
                 preserving the current values as defaults."
            }
            ReservedRole::PipelineMetrics => {
                "The variables in this cell will be transformed into pipeline metrics."
            }
            ReservedRole::Skip => "This cell will be skipped and excluded from pipeline steps",
        }
    }
}

impl fmt::Display for ReservedRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservedRole {
    type Err = NotebookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| NotebookError::InvalidStepName(s.to_string()))
    }
}

/// Check whether a name is a reserved role
#[inline]
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    ReservedRole::from_name(name).is_some()
}

/// Validate a user-declared step name
///
/// The empty name is valid and means "merge into the previous step".
pub fn validate_step_name(name: &str) -> Result<(), NotebookError> {
    if STEP_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(NotebookError::InvalidStepName(name.to_string()))
    }
}

/// Decoded step metadata of one cell
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepTags {
    /// Step name, reserved role name, or empty for a merge cell
    pub name: String,
    /// Steps this one depends on, in tag order
    pub dependencies: Vec<String>,
}

impl StepTags {
    /// Create step tags
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, dependencies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            dependencies,
        }
    }

    /// Reserved role of this cell, if any
    #[inline]
    #[must_use]
    pub fn role(&self) -> Option<ReservedRole> {
        ReservedRole::from_name(&self.name)
    }

    /// Whether this cell merges into the previous step
    #[inline]
    #[must_use]
    pub fn is_merge(&self) -> bool {
        self.name.is_empty()
    }

    /// Whether this cell declares a real (non-reserved) step
    #[inline]
    #[must_use]
    pub fn is_step(&self) -> bool {
        !self.is_merge() && self.role().is_none()
    }

    /// Check the name pattern and the reserved-role invariant
    pub fn validate(&self) -> Result<(), NotebookError> {
        if self.role().is_some() {
            if !self.dependencies.is_empty() {
                return Err(NotebookError::ReservedWithDependencies(self.name.clone()));
            }
            return Ok(());
        }
        validate_step_name(&self.name)?;
        for dep in &self.dependencies {
            if dep.is_empty() || is_reserved(dep) {
                return Err(NotebookError::UnknownDependency(dep.clone()));
            }
            validate_step_name(dep)?;
        }
        Ok(())
    }

    /// Encode into a tag list
    #[must_use]
    pub fn encode(&self) -> Vec<String> {
        encode(&self.name, &self.dependencies)
    }
}

/// Encode a step identity and its dependencies into a tag list
pub fn encode<S: AsRef<str>>(name: &str, dependencies: &[S]) -> Vec<String> {
    let identity = if is_reserved(name) {
        name.to_string()
    } else {
        format!("{BLOCK_PREFIX}{name}")
    };

    std::iter::once(identity)
        .chain(
            dependencies
                .iter()
                .map(|d| format!("{PREV_PREFIX}{}", d.as_ref())),
        )
        .collect()
}

/// Decode a cell's tag list
///
/// Returns `None` when no tag is recognized, meaning the cell has no step
/// metadata.
pub fn decode<S: AsRef<str>>(tags: &[S]) -> Option<StepTags> {
    let mut name = None;
    let mut dependencies = Vec::new();
    let mut recognized = false;

    for tag in tags {
        let tag = tag.as_ref();
        if let Some(dep) = tag.strip_prefix(PREV_PREFIX) {
            dependencies.push(dep.to_string());
            recognized = true;
        } else if name.is_none() {
            if is_reserved(tag) {
                name = Some(tag.to_string());
                recognized = true;
            } else if let Some(block) = tag.strip_prefix(BLOCK_PREFIX) {
                name = Some(block.to_string());
                recognized = true;
            }
        }
    }

    recognized.then(|| StepTags {
        name: name.unwrap_or_default(),
        dependencies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_named_step() {
        let tags = encode("train", &["load", "clean"]);
        assert_eq!(tags, vec!["block:train", "prev:load", "prev:clean"]);
    }

    #[test]
    fn encode_reserved_role_is_unprefixed() {
        let tags = encode::<&str>("pipeline-parameters", &[]);
        assert_eq!(tags, vec!["pipeline-parameters"]);
    }

    #[test]
    fn encode_merge_cell() {
        assert_eq!(encode::<&str>("", &[]), vec!["block:"]);
    }

    #[test]
    fn decode_takes_first_identity() {
        let decoded = decode(&["prev:a", "block:b", "skip", "block:c"]).unwrap();
        assert_eq!(decoded.name, "b");
        assert_eq!(decoded.dependencies, vec!["a"]);
    }

    #[test]
    fn decode_reserved_role() {
        let decoded = decode(&["imports"]).unwrap();
        assert_eq!(decoded.role(), Some(ReservedRole::Imports));
        assert!(decoded.dependencies.is_empty());
    }

    #[test]
    fn decode_unrecognized_is_none() {
        assert!(decode::<&str>(&[]).is_none());
        assert!(decode(&["parameters", "hide-input"]).is_none());
    }

    #[test]
    fn decode_only_edges_is_merge() {
        let decoded = decode(&["prev:a"]).unwrap();
        assert!(decoded.is_merge());
        assert_eq!(decoded.dependencies, vec!["a"]);
    }

    #[test]
    fn step_name_pattern() {
        assert!(validate_step_name("").is_ok());
        assert!(validate_step_name("_private").is_ok());
        assert!(validate_step_name("step_2").is_ok());
        assert!(validate_step_name("2step").is_err());
        assert!(validate_step_name("Train").is_err());
        assert!(validate_step_name("load-data").is_err());
    }

    #[test]
    fn reserved_role_with_dependencies_is_invalid() {
        let tags = StepTags::new("skip", vec!["a".into()]);
        assert!(matches!(
            tags.validate(),
            Err(NotebookError::ReservedWithDependencies(_))
        ));
    }

    #[test]
    fn reserved_role_parse() {
        assert_eq!(
            "pipeline-metrics".parse::<ReservedRole>().unwrap(),
            ReservedRole::PipelineMetrics
        );
        assert!("step".parse::<ReservedRole>().is_err());
        assert!(ReservedRole::Skip.help_text().contains("skipped"));
    }
}
